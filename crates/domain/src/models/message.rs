//! Message domain models: the append-only chat event, its polymorphic
//! content and the per-recipient delivery status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Polymorphic message content. Wire format is a tagged union; consumers
/// switch on the populated variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    UserJoinedChat {
        user_id: Uuid,
    },
    TicketClosed {
        ticket_id: i64,
        ticket_chat_id: i64,
        closed_by_user_id: Uuid,
    },
    TicketStatusChanged {
        ticket_id: i64,
        status: String,
    },
    TicketFirstMessage {
        ticket_id: i64,
        created_from_chat_id: Option<i64>,
    },
    RelatedTicketCreated {
        ticket_chat_id: i64,
        ticket_id: i64,
    },
}

impl MessageContent {
    /// System-notification variants are generated by the service itself
    /// and carry no sender.
    pub fn is_system(&self) -> bool {
        !matches!(self, MessageContent::Text { .. })
    }
}

/// An immutable event in a chat.
///
/// The id is a per-database monotonic BIGSERIAL and is the canonical chat
/// ordering; no separate sequence number exists. Delivery/read state is
/// tracked per recipient, never on the message row itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    /// None for system-generated notification messages.
    pub sender_id: Option<Uuid>,
    pub content: MessageContent,
    pub reply_to: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Per-recipient delivery state. Ordered: a status is never downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent = 1,
    Delivered = 2,
    Read = 3,
}

impl DeliveryStatus {
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }

    pub fn from_i16(code: i16) -> Option<DeliveryStatus> {
        match code {
            1 => Some(DeliveryStatus::Sent),
            2 => Some(DeliveryStatus::Delivered),
            3 => Some(DeliveryStatus::Read),
            _ => None,
        }
    }
}

/// Request payload for sending a text message.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000, message = "Message must be between 1 and 4000 characters"))]
    pub text: String,
    pub reply_to: Option<i64>,
}

/// Request payload for acknowledging delivery/read status.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UpdateMessageStatusRequest {
    pub status: DeliveryStatus,
    /// Cascade the update to all recipients instead of just the caller.
    #[serde(default)]
    pub update_for_all: bool,
}

/// Query parameters for the message listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListMessagesQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}
