//! Domain events published to the service-update bus after commit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chat::ChatType;
use super::ticket::TicketStatus;

/// A service update fanned out to downstream consumers (push notifications,
/// websocket gateways, search indices).
///
/// Events are published strictly after the storage transaction commits, one
/// delivery attempt per publish call. Consumers deduplicate by id + status,
/// so a caller-level retry of the whole operation is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServiceEvent {
    ChatCreated {
        chat_id: i64,
        created_by_user_id: Option<Uuid>,
        match_id: Option<Uuid>,
        chat_type: ChatType,
    },
    TicketCreated {
        created_by_user_id: Uuid,
        ticket_id: i64,
        match_id: Option<Uuid>,
        chat_id: i64,
    },
    TicketStatusChanged {
        ticket_id: i64,
        old_status: TicketStatus,
        new_status: TicketStatus,
        changed_by_user_id: Uuid,
    },
    MessageCreated {
        chat_id: i64,
        message_id: i64,
        sender_id: Option<Uuid>,
    },
}

impl ServiceEvent {
    /// Bus topic (pub/sub channel) the event is published to.
    pub fn topic(&self) -> &'static str {
        match self {
            ServiceEvent::ChatCreated { .. } => "messenger.chat.created",
            ServiceEvent::TicketCreated { .. } => "messenger.ticket.created",
            ServiceEvent::TicketStatusChanged { .. } => "messenger.ticket.status_changed",
            ServiceEvent::MessageCreated { .. } => "messenger.message.created",
        }
    }
}
