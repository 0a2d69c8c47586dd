//! Messages controller: message creation with unread fan-out, delivery
//! acknowledgements and windowed history reads.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::DomainError;
use crate::models::message::{ListMessagesQuery, SendMessageRequest, UpdateMessageStatusRequest};
use crate::models::{DeliveryStatus, Message, MessageContent, ServiceEvent};
use crate::storage::MessengerStore;

use super::publisher::{publish_all, EventPublisher};
use super::unread::UnreadCountersController;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct MessagesController {
    unread: UnreadCountersController,
    publisher: Arc<dyn EventPublisher>,
}

impl MessagesController {
    pub fn new(unread: UnreadCountersController, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { unread, publisher }
    }

    /// Inserts a message and increments the unread counter of every member
    /// except the sender. Does not commit; callers commit their transaction
    /// before publishing the returned event. System messages pass
    /// `sender_id = None` and count as unread for every member.
    pub async fn create_message<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
        sender_id: Option<Uuid>,
        content: MessageContent,
        reply_to: Option<i64>,
    ) -> Result<(Message, ServiceEvent), DomainError> {
        let message = store
            .insert_message(chat_id, sender_id, &content, reply_to)
            .await?;

        let members = store.list_members(chat_id).await?;
        let keys: Vec<(Uuid, i64)> = members
            .iter()
            .filter(|m| Some(m.user_id) != sender_id)
            .map(|m| (m.user_id, chat_id))
            .collect();
        self.unread.increment_many(&keys, 1).await?;

        let event = ServiceEvent::MessageCreated {
            chat_id,
            message_id: message.id,
            sender_id,
        };
        Ok((message, event))
    }

    /// The user-facing send path: membership and write-permission guards,
    /// then create, commit and publish.
    pub async fn send_message<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        chat_id: i64,
        request: &SendMessageRequest,
    ) -> Result<Message, DomainError> {
        let chat = store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;
        if chat.is_closed {
            return Err(DomainError::unprocessable("chat is closed"));
        }

        let membership = store
            .get_membership(chat_id, user_id)
            .await?
            .ok_or_else(|| DomainError::forbidden("not a member of this chat"))?;
        if !membership.has_write_permission {
            return Err(DomainError::forbidden("no write permission in this chat"));
        }

        let content = MessageContent::Text {
            text: request.text.clone(),
        };
        let (message, event) = self
            .create_message(store, chat_id, Some(user_id), content, request.reply_to)
            .await?;
        store.commit().await?;
        publish_all(self.publisher.as_ref(), &[event]).await;

        tracing::debug!(chat_id, message_id = message.id, "Message sent");
        Ok(message)
    }

    /// Delivery acknowledgement for every message up to `message_id`.
    ///
    /// The upgrade is monotone per recipient (SENT < DELIVERED < READ) and
    /// idempotent. A READ ack additionally advances the member's read
    /// progress and settles their unread counter; an ack cannot target the
    /// SENT state. Returns `(rows updated for user, rows updated overall)`.
    pub async fn update_message_status<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        chat_id: i64,
        message_id: i64,
        request: &UpdateMessageStatusRequest,
    ) -> Result<(u64, u64), DomainError> {
        store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;
        let message = store
            .get_message(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("message {}", message_id)))?;
        if message.chat_id != chat_id {
            return Err(DomainError::unprocessable(
                "message does not belong to this chat",
            ));
        }
        if !store.is_member(chat_id, user_id).await? {
            return Err(DomainError::forbidden("not a member of this chat"));
        }
        if request.status == DeliveryStatus::Sent {
            return Err(DomainError::unprocessable(
                "delivery status can only be advanced past sent",
            ));
        }

        let (for_user, total) = store
            .mark_delivery_status(
                chat_id,
                message_id,
                user_id,
                request.status,
                request.update_for_all,
            )
            .await?;

        match request.status {
            DeliveryStatus::Read => {
                store.set_read_progress(chat_id, user_id, message_id).await?;
            }
            DeliveryStatus::Delivered => {
                store
                    .set_received_progress(chat_id, user_id, message_id)
                    .await?;
            }
            DeliveryStatus::Sent => unreachable!(),
        }
        store.commit().await?;

        // Counter settlement happens after the commit: the tallies are a
        // cache over committed state and self-heal on the next read ack.
        if request.status == DeliveryStatus::Read && for_user > 0 {
            self.unread
                .decrement_many(&[(user_id, chat_id)], for_user as i64)
                .await?;
        }

        Ok((for_user, total))
    }

    /// Paginated history, newest first, clamped to the member's visibility
    /// window (`first_available_message_id ..= last_available_message_id`).
    pub async fn list_messages<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        chat_id: i64,
        query: &ListMessagesQuery,
    ) -> Result<(Vec<Message>, Option<String>), DomainError> {
        store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;
        let membership = store
            .get_membership(chat_id, user_id)
            .await?
            .ok_or_else(|| DomainError::forbidden("not a member of this chat"))?;
        if !membership.has_read_permission {
            return Err(DomainError::forbidden("no read permission in this chat"));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let before_id = match &query.cursor {
            Some(cursor) => Some(
                shared::pagination::decode_cursor(cursor)
                    .map_err(|e| DomainError::unprocessable(e.to_string()))?,
            ),
            None => None,
        };

        let messages = store
            .list_messages(
                chat_id,
                before_id,
                membership.first_available_message_id,
                membership.last_available_message_id,
                limit,
            )
            .await?;

        let next_cursor = if messages.len() == limit as usize {
            messages
                .last()
                .map(|m| shared::pagination::encode_cursor(m.id))
        } else {
            None
        };

        Ok((messages, next_cursor))
    }

    pub async fn get_last_message<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
    ) -> Result<Option<Message>, DomainError> {
        store.last_message(chat_id).await
    }

    pub async fn get_first_message<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
    ) -> Result<Option<Message>, DomainError> {
        store.first_message(chat_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMeta, ChatType, UserRole};
    use crate::services::publisher::MockEventPublisher;
    use crate::storage::{MemoryStore, MemoryUnreadCounters, NewMembership};

    struct Fixture {
        messages: MessagesController,
        unread: UnreadCountersController,
        publisher: Arc<MockEventPublisher>,
        store: MemoryStore,
    }

    async fn fixture_with_members(count: usize) -> (Fixture, i64, Vec<Uuid>) {
        let publisher = Arc::new(MockEventPublisher::new());
        let unread = UnreadCountersController::new(Arc::new(MemoryUnreadCounters::new()));
        let messages = MessagesController::new(unread.clone(), publisher.clone());
        let mut store = MemoryStore::new();

        let chat = store
            .create_chat(ChatType::Match, None, ChatMeta::default())
            .await
            .unwrap();
        let mut members = Vec::new();
        for _ in 0..count {
            let id = Uuid::new_v4();
            store
                .add_membership(NewMembership::primary(chat.id, id, UserRole::Scout))
                .await
                .unwrap();
            members.push(id);
        }

        (
            Fixture {
                messages,
                unread,
                publisher,
                store,
            },
            chat.id,
            members,
        )
    }

    #[tokio::test]
    async fn test_send_message_increments_unread_for_everyone_but_sender() {
        let (mut f, chat_id, members) = fixture_with_members(3).await;
        let sender = members[0];

        for _ in 0..4 {
            f.messages
                .send_message(
                    &mut f.store,
                    sender,
                    chat_id,
                    &SendMessageRequest {
                        text: "hello".to_string(),
                        reply_to: None,
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(f.unread.get_for_chat(sender, chat_id).await.unwrap(), 0);
        for other in &members[1..] {
            assert_eq!(f.unread.get_for_chat(*other, chat_id).await.unwrap(), 4);
        }
    }

    #[tokio::test]
    async fn test_send_message_publishes_after_commit() {
        let (mut f, chat_id, members) = fixture_with_members(2).await;

        let message = f
            .messages
            .send_message(
                &mut f.store,
                members[0],
                chat_id,
                &SendMessageRequest {
                    text: "hi".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(f.store.commit_count(), 1);
        assert!(matches!(
            f.publisher.events()[0],
            ServiceEvent::MessageCreated { message_id, .. } if message_id == message.id
        ));
    }

    #[tokio::test]
    async fn test_send_message_rejected_for_closed_chat() {
        let (mut f, chat_id, members) = fixture_with_members(1).await;
        f.store.set_chat_closed(chat_id, true).await.unwrap();

        let err = f
            .messages
            .send_message(
                &mut f.store,
                members[0],
                chat_id,
                &SendMessageRequest {
                    text: "late".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unprocessable(_)));
        assert_eq!(f.store.message_count(chat_id), 0);
    }

    #[tokio::test]
    async fn test_send_message_forbidden_for_non_member() {
        let (mut f, chat_id, _) = fixture_with_members(1).await;

        let err = f
            .messages
            .send_message(
                &mut f.store,
                Uuid::new_v4(),
                chat_id,
                &SendMessageRequest {
                    text: "who".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_send_message_forbidden_without_write_permission() {
        let (mut f, chat_id, _) = fixture_with_members(1).await;
        let reader = Uuid::new_v4();
        f.store
            .add_membership(NewMembership {
                chat_id,
                user_id: reader,
                user_role: UserRole::Bookmaker,
                is_primary_member: false,
                has_read_permission: true,
                has_write_permission: false,
                first_available_message_id: None,
            })
            .await
            .unwrap();

        let err = f
            .messages
            .send_message(
                &mut f.store,
                reader,
                chat_id,
                &SendMessageRequest {
                    text: "read only".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_read_ack_settles_unread_counter() {
        let (mut f, chat_id, members) = fixture_with_members(2).await;
        let (sender, reader) = (members[0], members[1]);

        let mut last_id = 0;
        for _ in 0..3 {
            let m = f
                .messages
                .send_message(
                    &mut f.store,
                    sender,
                    chat_id,
                    &SendMessageRequest {
                        text: "ping".to_string(),
                        reply_to: None,
                    },
                )
                .await
                .unwrap();
            last_id = m.id;
        }
        assert_eq!(f.unread.get_for_chat(reader, chat_id).await.unwrap(), 3);

        let (for_user, total) = f
            .messages
            .update_message_status(
                &mut f.store,
                reader,
                chat_id,
                last_id,
                &UpdateMessageStatusRequest {
                    status: DeliveryStatus::Read,
                    update_for_all: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(for_user, 3);
        assert_eq!(total, 3);
        assert_eq!(f.unread.get_for_chat(reader, chat_id).await.unwrap(), 0);

        let membership = f.store.get_membership(chat_id, reader).await.unwrap().unwrap();
        assert_eq!(membership.last_read_message_id, Some(last_id));
    }

    #[tokio::test]
    async fn test_read_ack_is_idempotent() {
        let (mut f, chat_id, members) = fixture_with_members(2).await;
        let (sender, reader) = (members[0], members[1]);

        let m = f
            .messages
            .send_message(
                &mut f.store,
                sender,
                chat_id,
                &SendMessageRequest {
                    text: "once".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap();

        let request = UpdateMessageStatusRequest {
            status: DeliveryStatus::Read,
            update_for_all: false,
        };
        let (first, _) = f
            .messages
            .update_message_status(&mut f.store, reader, chat_id, m.id, &request)
            .await
            .unwrap();
        let (second, _) = f
            .messages
            .update_message_status(&mut f.store, reader, chat_id, m.id, &request)
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(f.unread.get_for_chat(reader, chat_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_never_downgrades_to_delivered() {
        let (mut f, chat_id, members) = fixture_with_members(2).await;
        let (sender, reader) = (members[0], members[1]);

        let m = f
            .messages
            .send_message(
                &mut f.store,
                sender,
                chat_id,
                &SendMessageRequest {
                    text: "state".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap();

        f.messages
            .update_message_status(
                &mut f.store,
                reader,
                chat_id,
                m.id,
                &UpdateMessageStatusRequest {
                    status: DeliveryStatus::Read,
                    update_for_all: false,
                },
            )
            .await
            .unwrap();

        let (for_user, _) = f
            .messages
            .update_message_status(
                &mut f.store,
                reader,
                chat_id,
                m.id,
                &UpdateMessageStatusRequest {
                    status: DeliveryStatus::Delivered,
                    update_for_all: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(for_user, 0);
    }

    #[tokio::test]
    async fn test_ack_to_sent_is_rejected() {
        let (mut f, chat_id, members) = fixture_with_members(2).await;
        let m = f
            .messages
            .send_message(
                &mut f.store,
                members[0],
                chat_id,
                &SendMessageRequest {
                    text: "no".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap();

        let err = f
            .messages
            .update_message_status(
                &mut f.store,
                members[1],
                chat_id,
                m.id,
                &UpdateMessageStatusRequest {
                    status: DeliveryStatus::Sent,
                    update_for_all: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unprocessable(_)));
    }

    #[tokio::test]
    async fn test_ack_rejects_message_from_other_chat() {
        let (mut f, chat_id, members) = fixture_with_members(2).await;
        let other_chat = f
            .store
            .create_chat(ChatType::Match, None, ChatMeta::default())
            .await
            .unwrap();
        f.store
            .add_membership(NewMembership::primary(
                other_chat.id,
                members[0],
                UserRole::Scout,
            ))
            .await
            .unwrap();
        let stray = f
            .messages
            .send_message(
                &mut f.store,
                members[0],
                other_chat.id,
                &SendMessageRequest {
                    text: "elsewhere".to_string(),
                    reply_to: None,
                },
            )
            .await
            .unwrap();

        let err = f
            .messages
            .update_message_status(
                &mut f.store,
                members[1],
                chat_id,
                stray.id,
                &UpdateMessageStatusRequest {
                    status: DeliveryStatus::Read,
                    update_for_all: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unprocessable(_)));
    }

    #[tokio::test]
    async fn test_system_message_counts_unread_for_all_members() {
        let (mut f, chat_id, members) = fixture_with_members(2).await;

        f.messages
            .create_message(
                &mut f.store,
                chat_id,
                None,
                MessageContent::UserJoinedChat {
                    user_id: members[0],
                },
                None,
            )
            .await
            .unwrap();
        f.store.commit().await.unwrap();

        for member in &members {
            assert_eq!(f.unread.get_for_chat(*member, chat_id).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_list_messages_newest_first_with_cursor() {
        let (mut f, chat_id, members) = fixture_with_members(1).await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let m = f
                .messages
                .send_message(
                    &mut f.store,
                    members[0],
                    chat_id,
                    &SendMessageRequest {
                        text: format!("m{}", i),
                        reply_to: None,
                    },
                )
                .await
                .unwrap();
            ids.push(m.id);
        }

        let (page, cursor) = f
            .messages
            .list_messages(
                &mut f.store,
                members[0],
                chat_id,
                &ListMessagesQuery {
                    cursor: None,
                    limit: Some(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[4], ids[3], ids[2]]);

        let (rest, last_cursor) = f
            .messages
            .list_messages(
                &mut f.store,
                members[0],
                chat_id,
                &ListMessagesQuery {
                    cursor,
                    limit: Some(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(rest.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[1], ids[0]]);
        assert!(last_cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_messages_clamped_to_visibility_window() {
        let (mut f, chat_id, members) = fixture_with_members(1).await;
        let mut ids = Vec::new();
        for i in 0..4 {
            let m = f
                .messages
                .send_message(
                    &mut f.store,
                    members[0],
                    chat_id,
                    &SendMessageRequest {
                        text: format!("w{}", i),
                        reply_to: None,
                    },
                )
                .await
                .unwrap();
            ids.push(m.id);
        }

        // A late joiner only sees history from their join point onward.
        let late = Uuid::new_v4();
        f.store
            .add_membership(NewMembership {
                chat_id,
                user_id: late,
                user_role: UserRole::Supervisor,
                is_primary_member: false,
                has_read_permission: true,
                has_write_permission: true,
                first_available_message_id: Some(ids[2]),
            })
            .await
            .unwrap();

        let (visible, _) = f
            .messages
            .list_messages(&mut f.store, late, chat_id, &ListMessagesQuery::default())
            .await
            .unwrap();
        assert_eq!(visible.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[3], ids[2]]);
    }
}
