//! In-memory storage protocol implementation.
//!
//! Backs the controller test suites; behavior mirrors the Postgres store,
//! including idempotent joins, version bumps and monotone delivery-status
//! upgrades. Exported from the crate so sibling crates can use it in their
//! own tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{
    Chat, ChatMembership, ChatMeta, ChatType, DeliveryStatus, Message, MessageContent, SportMatch,
    Ticket, TicketStatus, User, UserRole,
};

use super::{
    ChatListFilter, MessengerStore, NewMembership, NewTicket, StoreResult, UnreadCounterStore,
};

/// In-memory [`MessengerStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    chats: BTreeMap<i64, Chat>,
    memberships: BTreeMap<(i64, Uuid), ChatMembership>,
    messages: BTreeMap<i64, Message>,
    delivery: HashMap<(i64, Uuid), DeliveryStatus>,
    tickets: BTreeMap<i64, Ticket>,
    users: HashMap<Uuid, User>,
    matches: HashMap<Uuid, SportMatch>,
    next_chat_id: i64,
    next_message_id: i64,
    next_ticket_id: i64,
    commits: u32,
    /// Makes the next `commit()` fail, for commit-before-publish tests.
    pub fail_commit: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn add_match(&mut self, sport_match: SportMatch) {
        self.matches.insert(sport_match.id, sport_match);
    }

    /// Number of successful commits on this store.
    pub fn commit_count(&self) -> u32 {
        self.commits
    }

    /// Message rows for a chat.
    pub fn message_count(&self, chat_id: i64) -> usize {
        self.messages.values().filter(|m| m.chat_id == chat_id).count()
    }

    /// Membership rows for a chat.
    pub fn membership_count(&self, chat_id: i64) -> usize {
        self.memberships.keys().filter(|(c, _)| *c == chat_id).count()
    }

    fn chat_mut(&mut self, chat_id: i64) -> StoreResult<&mut Chat> {
        self.chats
            .get_mut(&chat_id)
            .ok_or_else(|| DomainError::internal(format!("chat {} missing from store", chat_id)))
    }

    fn touch(chat: &mut Chat) {
        chat.version += 1;
        chat.updated_at = Utc::now();
    }

    fn last_activity(&self, chat: &Chat) -> DateTime<Utc> {
        self.messages
            .values()
            .filter(|m| m.chat_id == chat.id)
            .map(|m| m.created_at)
            .max()
            .map(|t| t.max(chat.updated_at))
            .unwrap_or(chat.updated_at)
    }

    fn chat_visible(&self, chat: &Chat, user_id: Uuid, role: UserRole) -> bool {
        if self.memberships.contains_key(&(chat.id, user_id)) {
            return true;
        }
        role.has_match_oversight() && chat.chat_type == ChatType::Match
    }

    /// Delivery upgrade for one recipient; returns rows changed.
    fn upgrade_delivery(
        delivery: &mut HashMap<(i64, Uuid), DeliveryStatus>,
        messages: &BTreeMap<i64, Message>,
        chat_id: i64,
        up_to: i64,
        user_id: Uuid,
        status: DeliveryStatus,
    ) -> u64 {
        let mut changed = 0;
        for message in messages.values() {
            if message.chat_id != chat_id || message.id > up_to {
                continue;
            }
            if message.sender_id == Some(user_id) {
                continue;
            }
            let current = delivery
                .get(&(message.id, user_id))
                .copied()
                .unwrap_or(DeliveryStatus::Sent);
            if current < status {
                delivery.insert((message.id, user_id), status);
                changed += 1;
            }
        }
        changed
    }
}

#[async_trait]
impl MessengerStore for MemoryStore {
    async fn create_chat(
        &mut self,
        chat_type: ChatType,
        match_id: Option<Uuid>,
        meta: ChatMeta,
    ) -> StoreResult<Chat> {
        self.next_chat_id += 1;
        let now = Utc::now();
        let chat = Chat {
            id: self.next_chat_id,
            chat_type,
            match_id,
            is_closed: false,
            meta,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_chat(&mut self, chat_id: i64) -> StoreResult<Option<Chat>> {
        Ok(self.chats.get(&chat_id).cloned())
    }

    async fn set_chat_closed(&mut self, chat_id: i64, is_closed: bool) -> StoreResult<Chat> {
        let chat = self.chat_mut(chat_id)?;
        chat.is_closed = is_closed;
        Self::touch(chat);
        Ok(chat.clone())
    }

    async fn merge_chat_meta(&mut self, chat_id: i64, patch: &ChatMeta) -> StoreResult<Chat> {
        let chat = self.chat_mut(chat_id)?;
        chat.meta = chat.meta.merge(patch);
        Self::touch(chat);
        Ok(chat.clone())
    }

    async fn list_chats_for_user(
        &mut self,
        user_id: Uuid,
        role: UserRole,
        filter: &ChatListFilter,
    ) -> StoreResult<Vec<Chat>> {
        let chats: Vec<Chat> = self
            .chats
            .values()
            .rev()
            .filter(|c| filter.before_chat_id.map_or(true, |b| c.id < b))
            .filter(|c| c.chat_type != ChatType::Ticket || filter.include_ticket_chats)
            .filter(|c| self.chat_visible(c, user_id, role))
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(chats)
    }

    async fn list_chat_ids_for_match(&mut self, match_id: Uuid) -> StoreResult<Vec<i64>> {
        Ok(self
            .chats
            .values()
            .filter(|c| c.match_id == Some(match_id))
            .map(|c| c.id)
            .collect())
    }

    async fn list_inactive_open_chats(&mut self, cutoff: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        let ids = self
            .chats
            .values()
            .filter(|c| !c.is_closed && c.chat_type != ChatType::Ticket)
            .filter(|c| self.last_activity(c) < cutoff)
            .map(|c| c.id)
            .collect();
        Ok(ids)
    }

    async fn add_membership(&mut self, membership: NewMembership) -> StoreResult<bool> {
        let key = (membership.chat_id, membership.user_id);
        if self.memberships.contains_key(&key) {
            return Ok(false);
        }
        self.memberships.insert(
            key,
            ChatMembership {
                chat_id: membership.chat_id,
                user_id: membership.user_id,
                user_role: membership.user_role,
                is_primary_member: membership.is_primary_member,
                has_read_permission: membership.has_read_permission,
                has_write_permission: membership.has_write_permission,
                last_read_message_id: None,
                last_received_message_id: None,
                first_available_message_id: membership.first_available_message_id,
                last_available_message_id: None,
                is_archive_member: false,
                joined_at: Utc::now(),
            },
        );
        let chat = self.chat_mut(membership.chat_id)?;
        Self::touch(chat);
        Ok(true)
    }

    async fn get_membership(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
    ) -> StoreResult<Option<ChatMembership>> {
        Ok(self.memberships.get(&(chat_id, user_id)).cloned())
    }

    async fn is_member(&mut self, chat_id: i64, user_id: Uuid) -> StoreResult<bool> {
        Ok(self.memberships.contains_key(&(chat_id, user_id)))
    }

    async fn list_members(&mut self, chat_id: i64) -> StoreResult<Vec<ChatMembership>> {
        Ok(self
            .memberships
            .values()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn set_read_progress(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
        message_id: i64,
    ) -> StoreResult<()> {
        if let Some(m) = self.memberships.get_mut(&(chat_id, user_id)) {
            if m.last_read_message_id.map_or(true, |cur| cur < message_id) {
                m.last_read_message_id = Some(message_id);
            }
            if m.last_received_message_id.map_or(true, |cur| cur < message_id) {
                m.last_received_message_id = Some(message_id);
            }
        }
        Ok(())
    }

    async fn set_received_progress(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
        message_id: i64,
    ) -> StoreResult<()> {
        if let Some(m) = self.memberships.get_mut(&(chat_id, user_id)) {
            if m.last_received_message_id.map_or(true, |cur| cur < message_id) {
                m.last_received_message_id = Some(message_id);
            }
        }
        Ok(())
    }

    async fn insert_message(
        &mut self,
        chat_id: i64,
        sender_id: Option<Uuid>,
        content: &MessageContent,
        reply_to: Option<i64>,
    ) -> StoreResult<Message> {
        if !self.chats.contains_key(&chat_id) {
            return Err(DomainError::internal(format!(
                "chat {} missing from store",
                chat_id
            )));
        }
        self.next_message_id += 1;
        let message = Message {
            id: self.next_message_id,
            chat_id,
            sender_id,
            content: content.clone(),
            reply_to,
            created_at: Utc::now(),
        };
        self.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&mut self, message_id: i64) -> StoreResult<Option<Message>> {
        Ok(self.messages.get(&message_id).cloned())
    }

    async fn last_message(&mut self, chat_id: i64) -> StoreResult<Option<Message>> {
        Ok(self
            .messages
            .values()
            .rev()
            .find(|m| m.chat_id == chat_id)
            .cloned())
    }

    async fn first_message(&mut self, chat_id: i64) -> StoreResult<Option<Message>> {
        Ok(self
            .messages
            .values()
            .find(|m| m.chat_id == chat_id)
            .cloned())
    }

    async fn list_messages(
        &mut self,
        chat_id: i64,
        before_id: Option<i64>,
        min_id: Option<i64>,
        max_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<Message>> {
        Ok(self
            .messages
            .values()
            .rev()
            .filter(|m| m.chat_id == chat_id)
            .filter(|m| before_id.map_or(true, |b| m.id < b))
            .filter(|m| min_id.map_or(true, |lo| m.id >= lo))
            .filter(|m| max_id.map_or(true, |hi| m.id <= hi))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn last_messages_for_chats(
        &mut self,
        chat_ids: &[i64],
    ) -> StoreResult<HashMap<i64, Message>> {
        let mut out = HashMap::new();
        for message in self.messages.values() {
            if chat_ids.contains(&message.chat_id) {
                out.insert(message.chat_id, message.clone());
            }
        }
        Ok(out)
    }

    async fn mark_delivery_status(
        &mut self,
        chat_id: i64,
        up_to_message_id: i64,
        user_id: Uuid,
        status: DeliveryStatus,
        update_for_all: bool,
    ) -> StoreResult<(u64, u64)> {
        let for_user = Self::upgrade_delivery(
            &mut self.delivery,
            &self.messages,
            chat_id,
            up_to_message_id,
            user_id,
            status,
        );

        let mut total = for_user;
        if update_for_all {
            let others: Vec<Uuid> = self
                .memberships
                .values()
                .filter(|m| m.chat_id == chat_id && m.user_id != user_id)
                .map(|m| m.user_id)
                .collect();
            for other in others {
                total += Self::upgrade_delivery(
                    &mut self.delivery,
                    &self.messages,
                    chat_id,
                    up_to_message_id,
                    other,
                    status,
                );
            }
        }

        Ok((for_user, total))
    }

    async fn insert_ticket(&mut self, new: NewTicket) -> StoreResult<Ticket> {
        if self.tickets.values().any(|t| t.chat_id == new.chat_id) {
            return Err(DomainError::conflict(format!(
                "ticket already exists for chat {}",
                new.chat_id
            )));
        }
        self.next_ticket_id += 1;
        let now = Utc::now();
        let ticket = Ticket {
            id: self.next_ticket_id,
            chat_id: new.chat_id,
            created_by: new.created_by,
            created_from_chat_id: new.created_from_chat_id,
            assigned_to_user_id: None,
            status: TicketStatus::New,
            comment: new.comment,
            close_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get_ticket(&mut self, ticket_id: i64) -> StoreResult<Option<Ticket>> {
        Ok(self.tickets.get(&ticket_id).cloned())
    }

    async fn get_ticket_by_chat_id(&mut self, chat_id: i64) -> StoreResult<Option<Ticket>> {
        Ok(self
            .tickets
            .values()
            .find(|t| t.chat_id == chat_id)
            .cloned())
    }

    async fn set_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
    ) -> StoreResult<Ticket> {
        let ticket = self
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| DomainError::internal(format!("ticket {} missing", ticket_id)))?;
        ticket.status = status;
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn assign_ticket(&mut self, ticket_id: i64, user_id: Uuid) -> StoreResult<Ticket> {
        let ticket = self
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| DomainError::internal(format!("ticket {} missing", ticket_id)))?;
        ticket.assigned_to_user_id = Some(user_id);
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn set_ticket_close_reason(
        &mut self,
        ticket_id: i64,
        close_reason: Option<&str>,
    ) -> StoreResult<()> {
        let ticket = self
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| DomainError::internal(format!("ticket {} missing", ticket_id)))?;
        ticket.close_reason = close_reason.map(|s| s.to_string());
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn ticket_exists_for_match(
        &mut self,
        user_id: Uuid,
        match_id: Uuid,
    ) -> StoreResult<bool> {
        let chat_ids: Vec<i64> = self
            .chats
            .values()
            .filter(|c| c.match_id == Some(match_id))
            .map(|c| c.id)
            .collect();
        Ok(self.tickets.values().any(|t| {
            t.created_by == user_id
                && t.status != TicketStatus::Confirmed
                && chat_ids.contains(&t.chat_id)
        }))
    }

    async fn get_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&user_id).cloned())
    }

    async fn get_match(&mut self, match_id: Uuid) -> StoreResult<Option<SportMatch>> {
        Ok(self.matches.get(&match_id).cloned())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if self.fail_commit {
            return Err(DomainError::Storage("commit failed".to_string()));
        }
        self.commits += 1;
        Ok(())
    }
}

/// In-memory [`UnreadCounterStore`].
#[derive(Debug, Default)]
pub struct MemoryUnreadCounters {
    counters: Mutex<HashMap<(Uuid, i64), i64>>,
}

impl MemoryUnreadCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UnreadCounterStore for MemoryUnreadCounters {
    async fn get(&self, user_id: Uuid, chat_id: i64) -> StoreResult<i64> {
        let counters = self.counters.lock().expect("counter lock poisoned");
        Ok(*counters.get(&(user_id, chat_id)).unwrap_or(&0))
    }

    async fn get_many(
        &self,
        user_id: Uuid,
        chat_ids: &[i64],
    ) -> StoreResult<HashMap<i64, i64>> {
        let counters = self.counters.lock().expect("counter lock poisoned");
        Ok(chat_ids
            .iter()
            .map(|&chat_id| {
                (
                    chat_id,
                    *counters.get(&(user_id, chat_id)).unwrap_or(&0),
                )
            })
            .collect())
    }

    async fn set(&self, user_id: Uuid, chat_id: i64, value: i64) -> StoreResult<()> {
        let mut counters = self.counters.lock().expect("counter lock poisoned");
        counters.insert((user_id, chat_id), value.max(0));
        Ok(())
    }

    async fn clean(&self, user_id: Uuid, chat_id: i64) -> StoreResult<()> {
        let mut counters = self.counters.lock().expect("counter lock poisoned");
        counters.remove(&(user_id, chat_id));
        Ok(())
    }

    async fn increment_many(&self, keys: &[(Uuid, i64)], delta: i64) -> StoreResult<()> {
        let mut counters = self.counters.lock().expect("counter lock poisoned");
        for key in keys {
            *counters.entry(*key).or_insert(0) += delta;
        }
        Ok(())
    }

    async fn decrement_many(&self, keys: &[(Uuid, i64)], delta: i64) -> StoreResult<()> {
        let mut counters = self.counters.lock().expect("counter lock poisoned");
        for key in keys {
            let entry = counters.entry(*key).or_insert(0);
            *entry = (*entry - delta).max(0);
        }
        Ok(())
    }
}
