//! Chats controller: chat lifecycle, idempotent membership management and
//! the role-filtered listing/detail views.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::DomainError;
use crate::models::chat::{ChatDetail, ChatSummary, ListChatsQuery, MemberView};
use crate::models::{Chat, ChatMembership, ChatMeta, ChatType, ServiceEvent, UserRole};
use crate::storage::{ChatListFilter, MessengerStore, NewMembership};

use super::presence::Presence;
use super::publisher::{publish_all, EventPublisher};
use super::unread::UnreadCountersController;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct ChatsController {
    unread: UnreadCountersController,
    presence: Arc<dyn Presence>,
    publisher: Arc<dyn EventPublisher>,
}

impl ChatsController {
    pub fn new(
        unread: UnreadCountersController,
        presence: Arc<dyn Presence>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            unread,
            presence,
            publisher,
        }
    }

    /// Creates a chat (version 0), commits and publishes `ChatCreated`.
    pub async fn create_chat<S: MessengerStore>(
        &self,
        store: &mut S,
        created_by: Option<Uuid>,
        chat_type: ChatType,
        match_id: Option<Uuid>,
        meta: ChatMeta,
    ) -> Result<Chat, DomainError> {
        let chat = store.create_chat(chat_type, match_id, meta).await?;
        store.commit().await?;

        let event = ServiceEvent::ChatCreated {
            chat_id: chat.id,
            created_by_user_id: created_by,
            match_id: chat.match_id,
            chat_type: chat.chat_type,
        };
        publish_all(self.publisher.as_ref(), &[event]).await;

        tracing::info!(chat_id = chat.id, chat_type = %chat.chat_type, "Chat created");
        Ok(chat)
    }

    /// Explicit, idempotent join. Returns false (no-op) when the user is
    /// already a member; never raises on duplicates.
    pub async fn add_user_to_chat<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        chat_id: i64,
        role: UserRole,
        is_primary_member: bool,
        has_read_permission: bool,
        has_write_permission: bool,
    ) -> Result<bool, DomainError> {
        store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;

        let added = store
            .add_membership(NewMembership {
                chat_id,
                user_id,
                user_role: role,
                is_primary_member,
                has_read_permission,
                has_write_permission,
                first_available_message_id: None,
            })
            .await?;
        store.commit().await?;

        if added {
            tracing::info!(chat_id, user_id = %user_id, role = %role, "User joined chat");
        }
        Ok(added)
    }

    /// Read-only membership check used as an authorization gate.
    pub async fn is_user_in_chat<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
        user_id: Uuid,
    ) -> Result<bool, DomainError> {
        store.is_member(chat_id, user_id).await
    }

    pub async fn get_chat_membership_details<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
        user_id: Uuid,
    ) -> Result<Option<ChatMembership>, DomainError> {
        store.get_membership(chat_id, user_id).await
    }

    /// Merges a partial meta into the chat meta and bumps the version.
    /// Keys the patch does not mention are never overwritten.
    pub async fn update_meta<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
        patch: &ChatMeta,
    ) -> Result<Chat, DomainError> {
        store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;

        let chat = store.merge_chat_meta(chat_id, patch).await?;
        store.commit().await?;
        Ok(chat)
    }

    /// Closes a chat. A no-op when already closed (no version bump).
    pub async fn close_chat<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
    ) -> Result<Chat, DomainError> {
        let chat = store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;
        if chat.is_closed {
            return Ok(chat);
        }

        let chat = store.set_chat_closed(chat_id, true).await?;
        store.commit().await?;

        tracing::info!(chat_id, "Chat closed");
        Ok(chat)
    }

    pub async fn reopen_chat<S: MessengerStore>(
        &self,
        store: &mut S,
        chat_id: i64,
    ) -> Result<Chat, DomainError> {
        let chat = store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;
        if !chat.is_closed {
            return Ok(chat);
        }

        let chat = store.set_chat_closed(chat_id, false).await?;
        store.commit().await?;

        tracing::info!(chat_id, "Chat reopened");
        Ok(chat)
    }

    /// Role-filtered, paginated chat listing enriched with unread counts
    /// and the most recent message per chat (one round trip for the page).
    ///
    /// A scout sees only chats they are a member of; bookmakers and
    /// supervisors additionally see every MATCH chat. TICKET chats are
    /// excluded unless `show_chats_for_tickets` is set.
    pub async fn list_chats<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        role: UserRole,
        query: &ListChatsQuery,
    ) -> Result<(Vec<ChatSummary>, Option<String>), DomainError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let before_chat_id = match &query.cursor {
            Some(cursor) => Some(
                shared::pagination::decode_cursor(cursor)
                    .map_err(|e| DomainError::unprocessable(e.to_string()))?,
            ),
            None => None,
        };

        let chats = store
            .list_chats_for_user(
                user_id,
                role,
                &ChatListFilter {
                    include_ticket_chats: query.show_chats_for_tickets,
                    before_chat_id,
                    limit,
                },
            )
            .await?;

        let chat_ids: Vec<i64> = chats.iter().map(|c| c.id).collect();
        let mut unread = self.unread.get_for_chats(user_id, &chat_ids).await?;
        let mut last_messages = store.last_messages_for_chats(&chat_ids).await?;

        let next_cursor = if chats.len() == limit as usize {
            chats
                .last()
                .map(|c| shared::pagination::encode_cursor(c.id))
        } else {
            None
        };

        let summaries = chats
            .into_iter()
            .map(|chat| {
                let unread_count = unread.remove(&chat.id).unwrap_or(0);
                let last_message = last_messages.remove(&chat.id);
                ChatSummary {
                    chat,
                    unread_count,
                    last_message,
                }
            })
            .collect();

        Ok((summaries, next_cursor))
    }

    /// Single-chat detail view with members annotated by live presence.
    pub async fn get_chat_details<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        role: UserRole,
        chat_id: i64,
    ) -> Result<ChatDetail, DomainError> {
        let chat = store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("chat {}", chat_id)))?;

        let is_member = store.is_member(chat_id, user_id).await?;
        let oversight = role.has_match_oversight() && chat.chat_type == ChatType::Match;
        if !is_member && !oversight {
            return Err(DomainError::forbidden("not a member of this chat"));
        }

        let members = store.list_members(chat_id).await?;
        let online: HashSet<Uuid> = self
            .presence
            .get_active_users()
            .await?
            .into_iter()
            .collect();

        let member_views = members
            .iter()
            .map(|m| MemberView {
                user_id: m.user_id,
                user_role: m.user_role,
                is_primary_member: m.is_primary_member,
                has_read_permission: m.has_read_permission,
                has_write_permission: m.has_write_permission,
                is_online: online.contains(&m.user_id),
            })
            .collect();

        let unread_count = self.unread.get_for_chat(user_id, chat_id).await?;
        let last_message = store.last_message(chat_id).await?;

        Ok(ChatDetail {
            chat,
            members: member_views,
            unread_count,
            last_message,
        })
    }
}
