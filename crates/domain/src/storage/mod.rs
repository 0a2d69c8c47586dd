//! The storage protocol: the abstract persistence boundary the controllers
//! operate on.
//!
//! A [`MessengerStore`] instance is a request-scoped unit of work over a
//! single transaction. Controllers call `commit()` exactly once, and only
//! after every mutation of the flow has been applied; nothing may be
//! published externally before that commit returns. Unread counters live in
//! a separate keyed store ([`UnreadCounterStore`]) whose multi-key
//! increment/decrement primitive is atomic per call.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{
    Chat, ChatMembership, ChatMeta, ChatType, DeliveryStatus, Message, MessageContent, SportMatch,
    Ticket, TicketStatus, User, UserRole,
};

pub use memory::{MemoryStore, MemoryUnreadCounters};

pub type StoreResult<T> = Result<T, DomainError>;

/// Parameters for an explicit membership join.
#[derive(Debug, Clone)]
pub struct NewMembership {
    pub chat_id: i64,
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub is_primary_member: bool,
    pub has_read_permission: bool,
    pub has_write_permission: bool,
    /// Visibility window lower bound for restricted joiners.
    pub first_available_message_id: Option<i64>,
}

impl NewMembership {
    /// A primary member with full permissions and unrestricted history.
    pub fn primary(chat_id: i64, user_id: Uuid, user_role: UserRole) -> Self {
        Self {
            chat_id,
            user_id,
            user_role,
            is_primary_member: true,
            has_read_permission: true,
            has_write_permission: true,
            first_available_message_id: None,
        }
    }
}

/// Parameters for ticket creation.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub chat_id: i64,
    pub created_by: Uuid,
    pub created_from_chat_id: Option<i64>,
    pub comment: Option<String>,
}

/// Filter for the role-scoped chat listing.
#[derive(Debug, Clone, Default)]
pub struct ChatListFilter {
    /// TICKET chats are excluded unless this is set.
    pub include_ticket_chats: bool,
    /// Page boundary: only chats with id strictly below this.
    pub before_chat_id: Option<i64>,
    pub limit: i64,
}

/// The persistence boundary for chats, memberships, messages, tickets and
/// the read-only user/match lookups. One instance per incoming operation;
/// never shared across concurrent requests.
#[async_trait]
pub trait MessengerStore: Send {
    // --- chats ---

    /// Creates a chat with version 0.
    async fn create_chat(
        &mut self,
        chat_type: ChatType,
        match_id: Option<Uuid>,
        meta: ChatMeta,
    ) -> StoreResult<Chat>;

    async fn get_chat(&mut self, chat_id: i64) -> StoreResult<Option<Chat>>;

    /// Sets the closed flag and bumps the chat version. Returns the
    /// updated chat.
    async fn set_chat_closed(&mut self, chat_id: i64, is_closed: bool) -> StoreResult<Chat>;

    /// Merges a partial meta into the stored meta (unspecified keys keep
    /// their value) and bumps the chat version.
    async fn merge_chat_meta(&mut self, chat_id: i64, patch: &ChatMeta) -> StoreResult<Chat>;

    /// Role-scoped chat listing, newest chat first: a scout sees only
    /// chats they are a member of; oversight roles additionally see every
    /// MATCH chat.
    async fn list_chats_for_user(
        &mut self,
        user_id: Uuid,
        role: UserRole,
        filter: &ChatListFilter,
    ) -> StoreResult<Vec<Chat>>;

    async fn list_chat_ids_for_match(&mut self, match_id: Uuid) -> StoreResult<Vec<i64>>;

    /// Open non-ticket chats with no activity since `cutoff` (candidates
    /// for the auto-closer).
    async fn list_inactive_open_chats(&mut self, cutoff: DateTime<Utc>) -> StoreResult<Vec<i64>>;

    // --- memberships ---

    /// Idempotent join: returns false (no-op) if the membership already
    /// exists. Bumps the chat version when a row is inserted.
    async fn add_membership(&mut self, membership: NewMembership) -> StoreResult<bool>;

    async fn get_membership(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
    ) -> StoreResult<Option<ChatMembership>>;

    async fn is_member(&mut self, chat_id: i64, user_id: Uuid) -> StoreResult<bool>;

    async fn list_members(&mut self, chat_id: i64) -> StoreResult<Vec<ChatMembership>>;

    /// Advances `last_read_message_id` (and `last_received_message_id` if
    /// it lags behind). Never moves backwards.
    async fn set_read_progress(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
        message_id: i64,
    ) -> StoreResult<()>;

    /// Advances `last_received_message_id`. Never moves backwards.
    async fn set_received_progress(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
        message_id: i64,
    ) -> StoreResult<()>;

    // --- messages ---

    async fn insert_message(
        &mut self,
        chat_id: i64,
        sender_id: Option<Uuid>,
        content: &MessageContent,
        reply_to: Option<i64>,
    ) -> StoreResult<Message>;

    async fn get_message(&mut self, message_id: i64) -> StoreResult<Option<Message>>;

    /// Most recent message by id (never by created_at).
    async fn last_message(&mut self, chat_id: i64) -> StoreResult<Option<Message>>;

    async fn first_message(&mut self, chat_id: i64) -> StoreResult<Option<Message>>;

    /// Messages of a chat, newest first, bounded by an exclusive
    /// `before_id` page boundary and an inclusive `[min_id, max_id]`
    /// visibility window.
    async fn list_messages(
        &mut self,
        chat_id: i64,
        before_id: Option<i64>,
        min_id: Option<i64>,
        max_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<Message>>;

    /// Most recent message per chat, one round trip for a page of chats.
    async fn last_messages_for_chats(
        &mut self,
        chat_ids: &[i64],
    ) -> StoreResult<HashMap<i64, Message>>;

    /// Upgrades per-recipient delivery state for every message of the chat
    /// with id <= `up_to_message_id` not sent by the recipient, skipping
    /// rows already at or above `status` (the update is idempotent and
    /// monotone). With `update_for_all`, cascades the same upgrade to all
    /// members. Returns `(rows updated for user, rows updated overall)`.
    async fn mark_delivery_status(
        &mut self,
        chat_id: i64,
        up_to_message_id: i64,
        user_id: Uuid,
        status: DeliveryStatus,
        update_for_all: bool,
    ) -> StoreResult<(u64, u64)>;

    // --- tickets ---

    /// Inserts a NEW ticket. At most one ticket may exist per chat.
    async fn insert_ticket(&mut self, new: NewTicket) -> StoreResult<Ticket>;

    async fn get_ticket(&mut self, ticket_id: i64) -> StoreResult<Option<Ticket>>;

    async fn get_ticket_by_chat_id(&mut self, chat_id: i64) -> StoreResult<Option<Ticket>>;

    async fn set_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
    ) -> StoreResult<Ticket>;

    async fn assign_ticket(&mut self, ticket_id: i64, user_id: Uuid) -> StoreResult<Ticket>;

    async fn set_ticket_close_reason(
        &mut self,
        ticket_id: i64,
        close_reason: Option<&str>,
    ) -> StoreResult<()>;

    /// True if the user already has a non-confirmed ticket for the match.
    async fn ticket_exists_for_match(
        &mut self,
        user_id: Uuid,
        match_id: Uuid,
    ) -> StoreResult<bool>;

    // --- users & matches (read-only) ---

    async fn get_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>>;

    async fn get_match(&mut self, match_id: Uuid) -> StoreResult<Option<SportMatch>>;

    // --- unit of work ---

    /// Commits the transaction. The single explicit commit point a
    /// controller must reach before any publish; at most once per store.
    async fn commit(&mut self) -> StoreResult<()>;
}

/// Per-(user, chat) unread tallies, with match-level aggregation derived by
/// summing the chats of a match. Increments/decrements over multiple keys
/// happen atomically in one round trip.
#[async_trait]
pub trait UnreadCounterStore: Send + Sync {
    async fn get(&self, user_id: Uuid, chat_id: i64) -> StoreResult<i64>;

    async fn get_many(
        &self,
        user_id: Uuid,
        chat_ids: &[i64],
    ) -> StoreResult<HashMap<i64, i64>>;

    async fn set(&self, user_id: Uuid, chat_id: i64, value: i64) -> StoreResult<()>;

    /// Zeroes the counter.
    async fn clean(&self, user_id: Uuid, chat_id: i64) -> StoreResult<()>;

    async fn increment_many(&self, keys: &[(Uuid, i64)], delta: i64) -> StoreResult<()>;

    /// Decrements, flooring each counter at 0.
    async fn decrement_many(&self, keys: &[(Uuid, i64)], delta: i64) -> StoreResult<()>;
}
