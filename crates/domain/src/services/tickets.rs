//! Tickets controller: the support-ticket state machine
//! (`NEW -> IN_PROGRESS -> SOLVED -> {CONFIRMED | IN_PROGRESS}`) and the two
//! creation paths, composed over the chats, messages and unread controllers.
//!
//! Every transition runs inside one storage transaction: ticket status, chat
//! membership, system messages and meta back-references are applied
//! together, committed once, and only then are the collected events
//! published.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::DomainError;
use crate::models::ticket::{CloseTicketRequest, CreateTicketRequest};
use crate::models::{
    Chat, ChatMeta, ChatType, MessageContent, ServiceEvent, Ticket, TicketStatus, User, UserRole,
};
use crate::storage::{MessengerStore, NewMembership, NewTicket};

use super::chats::ChatsController;
use super::messages::MessagesController;
use super::publisher::{publish_all, EventPublisher};
use super::unread::UnreadCountersController;

#[derive(Clone)]
pub struct TicketsController {
    chats: ChatsController,
    messages: MessagesController,
    unread: UnreadCountersController,
    publisher: Arc<dyn EventPublisher>,
}

impl TicketsController {
    pub fn new(
        chats: ChatsController,
        messages: MessagesController,
        unread: UnreadCountersController,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            chats,
            messages,
            unread,
            publisher,
        }
    }

    /// Creates a ticket, either escalated out of an existing MATCH chat or
    /// standalone with a fresh dedicated chat.
    pub async fn create_ticket<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        request: &CreateTicketRequest,
    ) -> Result<Ticket, DomainError> {
        let actor = self.load_user(store, user_id).await?;

        match request.created_from_chat_id {
            Some(source_chat_id) => {
                self.create_from_chat(store, &actor, source_chat_id, request)
                    .await
            }
            None => self.create_standalone(store, &actor, request).await,
        }
    }

    /// Escalation path: a BOOKMAKER who is a primary member of a MATCH chat
    /// spawns a dedicated TICKET chat with bidirectional meta
    /// back-references, a first-message notification in the new chat and a
    /// related-ticket notification plus the literal text in the source chat.
    async fn create_from_chat<S: MessengerStore>(
        &self,
        store: &mut S,
        actor: &User,
        source_chat_id: i64,
        request: &CreateTicketRequest,
    ) -> Result<Ticket, DomainError> {
        let source = store
            .get_chat(source_chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", source_chat_id)))?;

        if let Some(match_id) = source.match_id {
            let sport_match = store
                .get_match(match_id)
                .await?
                .ok_or_else(|| DomainError::not_found(format!("match {}", match_id)))?;
            if !sport_match.is_active {
                return Err(DomainError::unprocessable("match is no longer active"));
            }
            if store.ticket_exists_for_match(actor.id, match_id).await? {
                return Err(DomainError::conflict(
                    "an open ticket for this match already exists",
                ));
            }
        }

        if source.chat_type != ChatType::Match {
            return Err(DomainError::unprocessable(
                "tickets can only be created from match chats",
            ));
        }

        let membership = store
            .get_membership(source_chat_id, actor.id)
            .await?
            .ok_or_else(|| DomainError::forbidden("not a member of the source chat"))?;
        if actor.role != UserRole::Bookmaker || !membership.is_primary_member {
            return Err(DomainError::forbidden(
                "only a primary bookmaker member may escalate a chat",
            ));
        }

        let mut events = Vec::new();

        let ticket_chat = store
            .create_chat(ChatType::Ticket, source.match_id, ChatMeta::default())
            .await?;
        events.push(chat_created_event(&ticket_chat, Some(actor.id)));

        let ticket = store
            .insert_ticket(NewTicket {
                chat_id: ticket_chat.id,
                created_by: actor.id,
                created_from_chat_id: Some(source_chat_id),
                comment: request.comment.clone(),
            })
            .await?;

        store
            .merge_chat_meta(
                ticket_chat.id,
                &ChatMeta {
                    assigned_ticket_id: Some(ticket.id),
                    related_ticket_id: None,
                },
            )
            .await?;
        store
            .merge_chat_meta(
                source_chat_id,
                &ChatMeta {
                    assigned_ticket_id: None,
                    related_ticket_id: Some(ticket.id),
                },
            )
            .await?;

        store
            .add_membership(NewMembership::primary(ticket_chat.id, actor.id, actor.role))
            .await?;

        let (_, event) = self
            .messages
            .create_message(
                store,
                ticket_chat.id,
                None,
                MessageContent::TicketFirstMessage {
                    ticket_id: ticket.id,
                    created_from_chat_id: Some(source_chat_id),
                },
                None,
            )
            .await?;
        events.push(event);

        let (_, event) = self
            .messages
            .create_message(
                store,
                source_chat_id,
                None,
                MessageContent::RelatedTicketCreated {
                    ticket_chat_id: ticket_chat.id,
                    ticket_id: ticket.id,
                },
                None,
            )
            .await?;
        events.push(event);

        let (_, event) = self
            .messages
            .create_message(
                store,
                source_chat_id,
                Some(actor.id),
                MessageContent::Text {
                    text: request.message.clone(),
                },
                None,
            )
            .await?;
        events.push(event);

        events.push(ticket_created_event(&ticket, source.match_id));

        store.commit().await?;
        self.unread.clean(actor.id, ticket_chat.id).await?;
        publish_all(self.publisher.as_ref(), &events).await;

        tracing::info!(
            ticket_id = ticket.id,
            chat_id = ticket_chat.id,
            source_chat_id,
            "Ticket created from chat"
        );
        Ok(ticket)
    }

    /// Standalone path: SCOUT or BOOKMAKER only. A fresh TICKET chat is
    /// created with the creator as its sole primary member and an unread
    /// count of zero.
    async fn create_standalone<S: MessengerStore>(
        &self,
        store: &mut S,
        actor: &User,
        request: &CreateTicketRequest,
    ) -> Result<Ticket, DomainError> {
        if !actor.role.can_create_standalone_ticket() {
            return Err(DomainError::forbidden(
                "only scouts and bookmakers may create tickets",
            ));
        }

        let mut events = Vec::new();

        let chat = store
            .create_chat(ChatType::Ticket, None, ChatMeta::default())
            .await?;
        events.push(chat_created_event(&chat, Some(actor.id)));

        store
            .add_membership(NewMembership::primary(chat.id, actor.id, actor.role))
            .await?;

        let ticket = store
            .insert_ticket(NewTicket {
                chat_id: chat.id,
                created_by: actor.id,
                created_from_chat_id: None,
                comment: request.comment.clone(),
            })
            .await?;
        store
            .merge_chat_meta(
                chat.id,
                &ChatMeta {
                    assigned_ticket_id: Some(ticket.id),
                    related_ticket_id: None,
                },
            )
            .await?;

        let (_, event) = self
            .messages
            .create_message(
                store,
                chat.id,
                None,
                MessageContent::TicketFirstMessage {
                    ticket_id: ticket.id,
                    created_from_chat_id: None,
                },
                None,
            )
            .await?;
        events.push(event);

        let (_, event) = self
            .messages
            .create_message(
                store,
                chat.id,
                Some(actor.id),
                MessageContent::Text {
                    text: request.message.clone(),
                },
                None,
            )
            .await?;
        events.push(event);

        events.push(ticket_created_event(&ticket, None));

        store.commit().await?;
        self.unread.clean(actor.id, chat.id).await?;
        publish_all(self.publisher.as_ref(), &events).await;

        tracing::info!(ticket_id = ticket.id, chat_id = chat.id, "Ticket created");
        Ok(ticket)
    }

    /// NEW -> IN_PROGRESS: the acting supervisor claims the ticket, joins
    /// its chat with full permissions and gets their unread tally for the
    /// chat reset.
    pub async fn take_into_work<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        ticket_id: i64,
    ) -> Result<Ticket, DomainError> {
        let ticket = self.load_ticket(store, ticket_id).await?;
        ensure_assignable(&ticket, user_id)?;
        ensure_status(&ticket, TicketStatus::New)?;

        let mut events = Vec::new();

        let joined = store
            .add_membership(NewMembership {
                chat_id: ticket.chat_id,
                user_id,
                user_role: UserRole::Supervisor,
                is_primary_member: false,
                has_read_permission: true,
                has_write_permission: true,
                first_available_message_id: None,
            })
            .await?;
        if joined {
            let (_, event) = self
                .messages
                .create_message(
                    store,
                    ticket.chat_id,
                    None,
                    MessageContent::UserJoinedChat { user_id },
                    None,
                )
                .await?;
            events.push(event);
        }

        store.assign_ticket(ticket_id, user_id).await?;
        let ticket = store
            .set_ticket_status(ticket_id, TicketStatus::InProgress)
            .await?;
        events.push(status_changed_event(
            &ticket,
            TicketStatus::New,
            user_id,
        ));

        store.commit().await?;
        self.unread.clean(user_id, ticket.chat_id).await?;
        publish_all(self.publisher.as_ref(), &events).await;

        tracing::info!(ticket_id, assignee = %user_id, "Ticket taken into work");
        Ok(ticket)
    }

    /// {NEW, IN_PROGRESS} -> SOLVED: posts a ticket-closed system message in
    /// the ticket's chat and, when the ticket was escalated out of another
    /// chat, in that source chat as well.
    pub async fn close_ticket<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        ticket_id: i64,
        request: &CloseTicketRequest,
    ) -> Result<Ticket, DomainError> {
        let ticket = self.load_ticket(store, ticket_id).await?;
        ensure_assignable(&ticket, user_id)?;
        ensure_transition(&ticket, TicketStatus::Solved)?;
        let old_status = ticket.status;

        let mut events = Vec::new();

        let closed_notice = MessageContent::TicketClosed {
            ticket_id,
            ticket_chat_id: ticket.chat_id,
            closed_by_user_id: user_id,
        };
        let (_, event) = self
            .messages
            .create_message(store, ticket.chat_id, None, closed_notice.clone(), None)
            .await?;
        events.push(event);
        if let Some(source_chat_id) = ticket.created_from_chat_id {
            let (_, event) = self
                .messages
                .create_message(store, source_chat_id, None, closed_notice, None)
                .await?;
            events.push(event);
        }

        if request.close_reason.is_some() {
            store
                .set_ticket_close_reason(ticket_id, request.close_reason.as_deref())
                .await?;
        }
        let ticket = store
            .set_ticket_status(ticket_id, TicketStatus::Solved)
            .await?;
        events.push(status_changed_event(&ticket, old_status, user_id));

        store.commit().await?;
        publish_all(self.publisher.as_ref(), &events).await;

        tracing::info!(ticket_id, closed_by = %user_id, "Ticket solved");
        Ok(ticket)
    }

    /// SOLVED -> CONFIRMED. Terminal. Supervisors cannot certify their own
    /// resolution, so any non-supervisor chat member confirms.
    pub async fn confirm_ticket<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        ticket_id: i64,
    ) -> Result<Ticket, DomainError> {
        let ticket = self.load_ticket(store, ticket_id).await?;
        self.ensure_reviewer(store, &ticket, user_id).await?;
        ensure_transition(&ticket, TicketStatus::Confirmed)?;
        let old_status = ticket.status;

        let ticket = store
            .set_ticket_status(ticket_id, TicketStatus::Confirmed)
            .await?;

        store.commit().await?;
        publish_all(
            self.publisher.as_ref(),
            &[status_changed_event(&ticket, old_status, user_id)],
        )
        .await;

        tracing::info!(ticket_id, confirmed_by = %user_id, "Ticket confirmed");
        Ok(ticket)
    }

    /// SOLVED -> IN_PROGRESS: the creator side rejects the resolution and
    /// sends the ticket back, announced in-chat by a status-changed system
    /// message. May repeat any number of times before confirmation.
    pub async fn reopen_ticket<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        ticket_id: i64,
    ) -> Result<Ticket, DomainError> {
        let ticket = self.load_ticket(store, ticket_id).await?;
        self.ensure_reviewer(store, &ticket, user_id).await?;
        ensure_status(&ticket, TicketStatus::Solved)?;
        let old_status = ticket.status;

        let mut events = Vec::new();

        let (_, event) = self
            .messages
            .create_message(
                store,
                ticket.chat_id,
                None,
                MessageContent::TicketStatusChanged {
                    ticket_id,
                    status: TicketStatus::InProgress.as_str().to_string(),
                },
                None,
            )
            .await?;
        events.push(event);

        let ticket = store
            .set_ticket_status(ticket_id, TicketStatus::InProgress)
            .await?;
        events.push(status_changed_event(&ticket, old_status, user_id));

        store.commit().await?;
        publish_all(self.publisher.as_ref(), &events).await;

        tracing::info!(ticket_id, reopened_by = %user_id, "Ticket reopened");
        Ok(ticket)
    }

    pub async fn get_ticket<S: MessengerStore>(
        &self,
        store: &mut S,
        ticket_id: i64,
    ) -> Result<Ticket, DomainError> {
        self.load_ticket(store, ticket_id).await
    }

    async fn load_ticket<S: MessengerStore>(
        &self,
        store: &mut S,
        ticket_id: i64,
    ) -> Result<Ticket, DomainError> {
        store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("ticket {}", ticket_id)))
    }

    async fn load_user<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
    ) -> Result<User, DomainError> {
        store
            .get_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user {}", user_id)))
    }

    /// Confirmation/reopening is reserved to the creator side: the acting
    /// user must not be a supervisor and must be a member of the ticket's
    /// chat. The supervisor check comes first so that a resolving
    /// supervisor gets 403 regardless of the ticket's state.
    async fn ensure_reviewer<S: MessengerStore>(
        &self,
        store: &mut S,
        ticket: &Ticket,
        user_id: Uuid,
    ) -> Result<(), DomainError> {
        let actor = self.load_user(store, user_id).await?;
        if actor.role == UserRole::Supervisor {
            return Err(DomainError::forbidden(
                "supervisors cannot certify their own resolution",
            ));
        }
        if !self
            .chats
            .is_user_in_chat(store, ticket.chat_id, user_id)
            .await?
        {
            return Err(DomainError::forbidden("not a member of the ticket chat"));
        }
        Ok(())
    }
}

fn ensure_assignable(ticket: &Ticket, user_id: Uuid) -> Result<(), DomainError> {
    match ticket.assigned_to_user_id {
        Some(assignee) if assignee != user_id => Err(DomainError::forbidden(
            "ticket is assigned to another user",
        )),
        _ => Ok(()),
    }
}

/// Operations bound to one exact starting status use this instead of the
/// transition table: `take_into_work` requires NEW, `reopen_ticket` requires
/// SOLVED. Both land on IN_PROGRESS but must not be interchangeable.
fn ensure_status(ticket: &Ticket, expected: TicketStatus) -> Result<(), DomainError> {
    if ticket.status != expected {
        return Err(DomainError::unprocessable(format!(
            "ticket is {}, operation requires {}",
            ticket.status, expected
        )));
    }
    Ok(())
}

fn ensure_transition(ticket: &Ticket, next: TicketStatus) -> Result<(), DomainError> {
    if !ticket.status.can_transition_to(next) {
        return Err(DomainError::unprocessable(format!(
            "ticket cannot move from {} to {}",
            ticket.status, next
        )));
    }
    Ok(())
}

fn chat_created_event(chat: &Chat, created_by: Option<Uuid>) -> ServiceEvent {
    ServiceEvent::ChatCreated {
        chat_id: chat.id,
        created_by_user_id: created_by,
        match_id: chat.match_id,
        chat_type: chat.chat_type,
    }
}

fn ticket_created_event(ticket: &Ticket, match_id: Option<Uuid>) -> ServiceEvent {
    ServiceEvent::TicketCreated {
        created_by_user_id: ticket.created_by,
        ticket_id: ticket.id,
        match_id,
        chat_id: ticket.chat_id,
    }
}

fn status_changed_event(ticket: &Ticket, old_status: TicketStatus, by: Uuid) -> ServiceEvent {
    ServiceEvent::TicketStatusChanged {
        ticket_id: ticket.id,
        old_status,
        new_status: ticket.status,
        changed_by_user_id: by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SportMatch;
    use crate::services::presence::MockPresence;
    use crate::services::publisher::MockEventPublisher;
    use crate::storage::{MemoryStore, MemoryUnreadCounters};

    struct Fixture {
        tickets: TicketsController,
        unread: UnreadCountersController,
        publisher: Arc<MockEventPublisher>,
        store: MemoryStore,
    }

    fn fixture() -> Fixture {
        let publisher = Arc::new(MockEventPublisher::new());
        let presence = Arc::new(MockPresence::new());
        let unread = UnreadCountersController::new(Arc::new(MemoryUnreadCounters::new()));
        let chats = ChatsController::new(unread.clone(), presence, publisher.clone());
        let messages = MessagesController::new(unread.clone(), publisher.clone());
        let tickets = TicketsController::new(chats, messages, unread.clone(), publisher.clone());
        Fixture {
            tickets,
            unread,
            publisher,
            store: MemoryStore::new(),
        }
    }

    fn add_user(store: &mut MemoryStore, role: UserRole) -> Uuid {
        let id = Uuid::new_v4();
        store.add_user(User {
            id,
            role,
            display_name: format!("{} user", role),
        });
        id
    }

    fn request(message: &str) -> CreateTicketRequest {
        CreateTicketRequest {
            message: message.to_string(),
            comment: None,
            created_from_chat_id: None,
        }
    }

    /// Sets up a MATCH chat with a bookmaker primary member and one scout.
    async fn match_chat_setup(f: &mut Fixture) -> (Uuid, Uuid, Uuid, i64) {
        let match_id = Uuid::new_v4();
        f.store.add_match(SportMatch {
            id: match_id,
            name: "derby".to_string(),
            is_active: true,
        });
        let bookmaker = add_user(&mut f.store, UserRole::Bookmaker);
        let scout = add_user(&mut f.store, UserRole::Scout);

        let chat = f
            .store
            .create_chat(ChatType::Match, Some(match_id), ChatMeta::default())
            .await
            .unwrap();
        for (user, role) in [(bookmaker, UserRole::Bookmaker), (scout, UserRole::Scout)] {
            f.store
                .add_membership(NewMembership::primary(chat.id, user, role))
                .await
                .unwrap();
        }

        (bookmaker, scout, match_id, chat.id)
    }

    #[tokio::test]
    async fn test_standalone_ticket_creation() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);

        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("my expenses are wrong"))
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::New);
        assert!(ticket.assigned_to_user_id.is_none());
        assert!(ticket.created_from_chat_id.is_none());

        let chat = f.store.get_chat(ticket.chat_id).await.unwrap().unwrap();
        assert_eq!(chat.chat_type, ChatType::Ticket);
        assert_eq!(chat.meta.assigned_ticket_id, Some(ticket.id));
        assert_eq!(f.store.membership_count(chat.id), 1);

        // First-message notification then the literal text, in id order.
        let messages = f
            .store
            .list_messages(chat.id, None, None, None, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            messages[1].content,
            MessageContent::TicketFirstMessage { ticket_id, .. } if ticket_id == ticket.id
        ));
        assert!(matches!(messages[0].content, MessageContent::Text { .. }));

        // The creator starts with a clean slate.
        assert_eq!(f.unread.get_for_chat(scout, chat.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_standalone_ticket_forbidden_for_supervisor() {
        let mut f = fixture();
        let supervisor = add_user(&mut f.store, UserRole::Supervisor);

        let err = f
            .tickets
            .create_ticket(&mut f.store, supervisor, &request("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_ticket_from_match_chat() {
        let mut f = fixture();
        let (bookmaker, _, match_id, source_chat_id) = match_chat_setup(&mut f).await;

        let ticket = f
            .tickets
            .create_ticket(
                &mut f.store,
                bookmaker,
                &CreateTicketRequest {
                    message: "odds feed is frozen".to_string(),
                    comment: Some("urgent".to_string()),
                    created_from_chat_id: Some(source_chat_id),
                },
            )
            .await
            .unwrap();

        let ticket_chat = f.store.get_chat(ticket.chat_id).await.unwrap().unwrap();
        assert_eq!(ticket_chat.chat_type, ChatType::Ticket);
        assert_eq!(ticket_chat.match_id, Some(match_id));
        assert_eq!(ticket_chat.meta.assigned_ticket_id, Some(ticket.id));
        // Only the escalating bookmaker joins the new chat.
        assert_eq!(f.store.membership_count(ticket_chat.id), 1);

        let source = f.store.get_chat(source_chat_id).await.unwrap().unwrap();
        assert_eq!(source.meta.related_ticket_id, Some(ticket.id));

        let source_messages = f
            .store
            .list_messages(source_chat_id, None, None, None, 10)
            .await
            .unwrap();
        let related: Vec<_> = source_messages
            .iter()
            .filter(|m| matches!(m.content, MessageContent::RelatedTicketCreated { .. }))
            .collect();
        assert_eq!(related.len(), 1);
        assert!(matches!(
            source_messages[0].content,
            MessageContent::Text { ref text } if text == "odds feed is frozen"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_match_ticket_conflicts() {
        let mut f = fixture();
        let (bookmaker, _, _, source_chat_id) = match_chat_setup(&mut f).await;

        let mut req = request("first");
        req.created_from_chat_id = Some(source_chat_id);
        f.tickets
            .create_ticket(&mut f.store, bookmaker, &req)
            .await
            .unwrap();

        let err = f
            .tickets
            .create_ticket(&mut f.store, bookmaker, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_escalation_rejected_for_inactive_match() {
        let mut f = fixture();
        let (bookmaker, _, match_id, source_chat_id) = match_chat_setup(&mut f).await;
        f.store.add_match(SportMatch {
            id: match_id,
            name: "derby".to_string(),
            is_active: false,
        });

        let mut req = request("too late");
        req.created_from_chat_id = Some(source_chat_id);
        let err = f
            .tickets
            .create_ticket(&mut f.store, bookmaker, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unprocessable(_)));
    }

    #[tokio::test]
    async fn test_escalation_forbidden_for_scout() {
        let mut f = fixture();
        let (_, scout, _, source_chat_id) = match_chat_setup(&mut f).await;

        let mut req = request("scouts cannot escalate");
        req.created_from_chat_id = Some(source_chat_id);
        let err = f
            .tickets
            .create_ticket(&mut f.store, scout, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_escalation_rejected_for_non_match_chat() {
        let mut f = fixture();
        let bookmaker = add_user(&mut f.store, UserRole::Bookmaker);
        let chat = f
            .store
            .create_chat(ChatType::Personal, None, ChatMeta::default())
            .await
            .unwrap();
        f.store
            .add_membership(NewMembership::primary(chat.id, bookmaker, UserRole::Bookmaker))
            .await
            .unwrap();

        let mut req = request("wrong source");
        req.created_from_chat_id = Some(chat.id);
        let err = f
            .tickets
            .create_ticket(&mut f.store, bookmaker, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unprocessable(_)));
    }

    #[tokio::test]
    async fn test_take_into_work() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let supervisor = add_user(&mut f.store, UserRole::Supervisor);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("help"))
            .await
            .unwrap();

        let ticket = f
            .tickets
            .take_into_work(&mut f.store, supervisor, ticket.id)
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert_eq!(ticket.assigned_to_user_id, Some(supervisor));

        let membership = f
            .store
            .get_membership(ticket.chat_id, supervisor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.user_role, UserRole::Supervisor);
        assert!(membership.has_write_permission);

        let messages = f
            .store
            .list_messages(ticket.chat_id, None, None, None, 10)
            .await
            .unwrap();
        assert!(messages
            .iter()
            .any(|m| matches!(m.content, MessageContent::UserJoinedChat { user_id } if user_id == supervisor)));

        // Claiming resets the claimer's unread tally for the chat.
        assert_eq!(
            f.unread.get_for_chat(supervisor, ticket.chat_id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_take_into_work_assigned_elsewhere_mutates_nothing() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let first = add_user(&mut f.store, UserRole::Supervisor);
        let second = add_user(&mut f.store, UserRole::Supervisor);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("claimed"))
            .await
            .unwrap();
        f.store.assign_ticket(ticket.id, first).await.unwrap();
        f.store.commit().await.unwrap();

        let members_before = f.store.membership_count(ticket.chat_id);
        let messages_before = f.store.message_count(ticket.chat_id);
        let commits_before = f.store.commit_count();

        let err = f
            .tickets
            .take_into_work(&mut f.store, second, ticket.id)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(f.store.membership_count(ticket.chat_id), members_before);
        assert_eq!(f.store.message_count(ticket.chat_id), messages_before);
        assert_eq!(f.store.commit_count(), commits_before);
        let unchanged = f.store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, TicketStatus::New);
    }

    #[tokio::test]
    async fn test_take_solved_ticket_is_unprocessable() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let supervisor = add_user(&mut f.store, UserRole::Supervisor);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("recurring"))
            .await
            .unwrap();
        f.tickets
            .take_into_work(&mut f.store, supervisor, ticket.id)
            .await
            .unwrap();
        f.tickets
            .close_ticket(
                &mut f.store,
                supervisor,
                ticket.id,
                &CloseTicketRequest { close_reason: None },
            )
            .await
            .unwrap();

        // The assigned supervisor must not sidestep review by re-claiming
        // their own solved ticket.
        let err = f
            .tickets
            .take_into_work(&mut f.store, supervisor, ticket.id)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Unprocessable(_)));
        let unchanged = f.store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, TicketStatus::Solved);
    }

    #[tokio::test]
    async fn test_reopen_new_ticket_is_unprocessable() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("too soon"))
            .await
            .unwrap();

        let err = f
            .tickets
            .reopen_ticket(&mut f.store, scout, ticket.id)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Unprocessable(_)));
        let unchanged = f.store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, TicketStatus::New);
    }

    #[tokio::test]
    async fn test_close_ticket_posts_notice_in_both_chats() {
        let mut f = fixture();
        let (bookmaker, _, _, source_chat_id) = match_chat_setup(&mut f).await;
        let supervisor = add_user(&mut f.store, UserRole::Supervisor);

        let mut req = request("escalate me");
        req.created_from_chat_id = Some(source_chat_id);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, bookmaker, &req)
            .await
            .unwrap();
        f.tickets
            .take_into_work(&mut f.store, supervisor, ticket.id)
            .await
            .unwrap();

        let ticket = f
            .tickets
            .close_ticket(
                &mut f.store,
                supervisor,
                ticket.id,
                &CloseTicketRequest {
                    close_reason: Some("resolved upstream".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::Solved);
        let stored = f.store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.close_reason.as_deref(), Some("resolved upstream"));

        for chat_id in [ticket.chat_id, source_chat_id] {
            let messages = f
                .store
                .list_messages(chat_id, None, None, None, 20)
                .await
                .unwrap();
            assert!(
                messages
                    .iter()
                    .any(|m| matches!(m.content, MessageContent::TicketClosed { .. })),
                "missing closed notice in chat {}",
                chat_id
            );
        }
    }

    #[tokio::test]
    async fn test_close_new_ticket_without_assignee() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("never mind"))
            .await
            .unwrap();

        let ticket = f
            .tickets
            .close_ticket(
                &mut f.store,
                scout,
                ticket.id,
                &CloseTicketRequest { close_reason: None },
            )
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Solved);
    }

    #[tokio::test]
    async fn test_solve_reopen_solve_confirm_cycle() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let supervisor = add_user(&mut f.store, UserRole::Supervisor);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("flaky"))
            .await
            .unwrap();
        f.tickets
            .take_into_work(&mut f.store, supervisor, ticket.id)
            .await
            .unwrap();

        let close_req = CloseTicketRequest { close_reason: None };

        let t = f
            .tickets
            .close_ticket(&mut f.store, supervisor, ticket.id, &close_req)
            .await
            .unwrap();
        assert_eq!(t.status, TicketStatus::Solved);

        // The assigned supervisor cannot certify at any point.
        let err = f
            .tickets
            .confirm_ticket(&mut f.store, supervisor, ticket.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let t = f
            .tickets
            .reopen_ticket(&mut f.store, scout, ticket.id)
            .await
            .unwrap();
        assert_eq!(t.status, TicketStatus::InProgress);

        let t = f
            .tickets
            .close_ticket(&mut f.store, supervisor, ticket.id, &close_req)
            .await
            .unwrap();
        assert_eq!(t.status, TicketStatus::Solved);

        let t = f
            .tickets
            .confirm_ticket(&mut f.store, scout, ticket.id)
            .await
            .unwrap();
        assert_eq!(t.status, TicketStatus::Confirmed);

        // Terminal: nothing moves out of CONFIRMED.
        let err = f
            .tickets
            .reopen_ticket(&mut f.store, scout, ticket.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unprocessable(_)));
    }

    #[tokio::test]
    async fn test_confirm_requires_chat_membership() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let outsider = add_user(&mut f.store, UserRole::Scout);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("mine"))
            .await
            .unwrap();
        f.tickets
            .close_ticket(
                &mut f.store,
                scout,
                ticket.id,
                &CloseTicketRequest { close_reason: None },
            )
            .await
            .unwrap();

        let err = f
            .tickets
            .confirm_ticket(&mut f.store, outsider, ticket.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_confirm_before_solved_is_unprocessable() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("early"))
            .await
            .unwrap();

        let err = f
            .tickets
            .confirm_ticket(&mut f.store, scout, ticket.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unprocessable(_)));
    }

    #[tokio::test]
    async fn test_reopen_posts_status_message() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("again"))
            .await
            .unwrap();
        f.tickets
            .close_ticket(
                &mut f.store,
                scout,
                ticket.id,
                &CloseTicketRequest { close_reason: None },
            )
            .await
            .unwrap();
        f.tickets
            .reopen_ticket(&mut f.store, scout, ticket.id)
            .await
            .unwrap();

        let messages = f
            .store
            .list_messages(ticket.chat_id, None, None, None, 20)
            .await
            .unwrap();
        assert!(messages.iter().any(|m| matches!(
            m.content,
            MessageContent::TicketStatusChanged { ref status, .. } if status == "in_progress"
        )));
    }

    #[tokio::test]
    async fn test_events_published_after_creation() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);

        let ticket = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("events"))
            .await
            .unwrap();

        let events = f.publisher.events();
        assert!(matches!(
            events.first(),
            Some(ServiceEvent::ChatCreated { chat_id, .. }) if *chat_id == ticket.chat_id
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            ServiceEvent::TicketCreated { ticket_id, .. } if *ticket_id == ticket.id
        )));
    }

    #[tokio::test]
    async fn test_failed_commit_suppresses_publish() {
        let mut f = fixture();
        let scout = add_user(&mut f.store, UserRole::Scout);
        f.store.fail_commit = true;

        let err = f
            .tickets
            .create_ticket(&mut f.store, scout, &request("doomed"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Storage(_)));
        assert!(f.publisher.events().is_empty());
    }
}
