//! Transactional Postgres implementation of the domain storage protocol.
//!
//! One [`PgStore`] wraps one database transaction and lives for one incoming
//! operation. Every mutation goes through the transaction; `commit()`
//! consumes it. A store is never shared across requests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use domain::models::{
    Chat, ChatMembership, ChatMeta, ChatType, DeliveryStatus, Message, MessageContent, SportMatch,
    Ticket, TicketStatus, User, UserRole,
};
use domain::storage::{ChatListFilter, MessengerStore, NewMembership, NewTicket, StoreResult};
use domain::DomainError;

use crate::entities::{
    ChatEntity, ChatMembershipEntity, ChatTypeDb, MessageEntity, SportMatchEntity, TicketEntity,
    TicketStatusDb, UserEntity, UserRoleDb,
};

const CHAT_COLUMNS: &str = "id, chat_type, match_id, is_closed, meta, version, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str = "chat_id, user_id, user_role, is_primary_member, \
     has_read_permission, has_write_permission, last_read_message_id, \
     last_received_message_id, first_available_message_id, \
     last_available_message_id, is_archive_member, joined_at";
const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, reply_to, created_at";
const TICKET_COLUMNS: &str = "id, chat_id, created_by, created_from_chat_id, \
     assigned_to_user_id, status, comment, close_reason, created_at, updated_at";

/// Postgres-backed unit of work over the messenger tables.
pub struct PgStore {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    /// Opens a new transaction from the pool.
    pub async fn begin(pool: &PgPool) -> Result<Self, DomainError> {
        let tx = pool.begin().await.map_err(db_err)?;
        Ok(Self { tx: Some(tx) })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, DomainError> {
        self.tx
            .as_mut()
            .ok_or_else(|| DomainError::internal("transaction already committed"))
    }

    async fn bump_chat_version(&mut self, chat_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE chats SET version = version + 1, updated_at = now() WHERE id = $1")
            .bind(chat_id)
            .execute(&mut **self.tx()?)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> DomainError {
    DomainError::Storage(err.to_string())
}

fn json_err(err: serde_json::Error) -> DomainError {
    DomainError::internal(format!("malformed JSONB column: {}", err))
}

fn chat_from(entity: ChatEntity) -> StoreResult<Chat> {
    Chat::try_from(entity).map_err(json_err)
}

fn message_from(entity: MessageEntity) -> StoreResult<Message> {
    Message::try_from(entity).map_err(json_err)
}

#[async_trait]
impl MessengerStore for PgStore {
    async fn create_chat(
        &mut self,
        chat_type: ChatType,
        match_id: Option<Uuid>,
        meta: ChatMeta,
    ) -> StoreResult<Chat> {
        let meta = serde_json::to_value(&meta).map_err(json_err)?;
        let entity = sqlx::query_as::<_, ChatEntity>(&format!(
            "INSERT INTO chats (chat_type, match_id, meta) VALUES ($1, $2, $3) RETURNING {}",
            CHAT_COLUMNS
        ))
        .bind(ChatTypeDb::from(chat_type))
        .bind(match_id)
        .bind(meta)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        chat_from(entity)
    }

    async fn get_chat(&mut self, chat_id: i64) -> StoreResult<Option<Chat>> {
        let entity = sqlx::query_as::<_, ChatEntity>(&format!(
            "SELECT {} FROM chats WHERE id = $1",
            CHAT_COLUMNS
        ))
        .bind(chat_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        entity.map(chat_from).transpose()
    }

    async fn set_chat_closed(&mut self, chat_id: i64, is_closed: bool) -> StoreResult<Chat> {
        let entity = sqlx::query_as::<_, ChatEntity>(&format!(
            "UPDATE chats SET is_closed = $2, version = version + 1, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            CHAT_COLUMNS
        ))
        .bind(chat_id)
        .bind(is_closed)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        chat_from(entity)
    }

    async fn merge_chat_meta(&mut self, chat_id: i64, patch: &ChatMeta) -> StoreResult<Chat> {
        // Read-modify-write inside the transaction so the typed merge is the
        // single place deciding which keys an update may touch.
        let entity = sqlx::query_as::<_, ChatEntity>(&format!(
            "SELECT {} FROM chats WHERE id = $1 FOR UPDATE",
            CHAT_COLUMNS
        ))
        .bind(chat_id)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)?;

        let current = chat_from(entity)?;
        let merged = current.meta.merge(patch);
        let merged_json = serde_json::to_value(&merged).map_err(json_err)?;

        let entity = sqlx::query_as::<_, ChatEntity>(&format!(
            "UPDATE chats SET meta = $2, version = version + 1, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            CHAT_COLUMNS
        ))
        .bind(chat_id)
        .bind(merged_json)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        chat_from(entity)
    }

    async fn list_chats_for_user(
        &mut self,
        user_id: Uuid,
        role: UserRole,
        filter: &ChatListFilter,
    ) -> StoreResult<Vec<Chat>> {
        let entities = sqlx::query_as::<_, ChatEntity>(&format!(
            "SELECT {} FROM chats c \
             WHERE (EXISTS (SELECT 1 FROM chat_memberships cm \
                            WHERE cm.chat_id = c.id AND cm.user_id = $1) \
                    OR ($2 AND c.chat_type = 'match')) \
               AND ($3 OR c.chat_type <> 'ticket') \
               AND ($4::BIGINT IS NULL OR c.id < $4) \
             ORDER BY c.id DESC \
             LIMIT $5",
            CHAT_COLUMNS
        ))
        .bind(user_id)
        .bind(role.has_match_oversight())
        .bind(filter.include_ticket_chats)
        .bind(filter.before_chat_id)
        .bind(filter.limit)
        .fetch_all(&mut **self.tx()?)
        .await
        .map_err(db_err)?;

        entities.into_iter().map(chat_from).collect()
    }

    async fn list_chat_ids_for_match(&mut self, match_id: Uuid) -> StoreResult<Vec<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM chats WHERE match_id = $1 ORDER BY id")
            .bind(match_id)
            .fetch_all(&mut **self.tx()?)
            .await
            .map_err(db_err)
    }

    async fn list_inactive_open_chats(&mut self, cutoff: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT c.id FROM chats c \
             WHERE c.is_closed = false \
               AND c.chat_type <> 'ticket' \
               AND GREATEST(COALESCE((SELECT max(m.created_at) FROM messages m \
                                      WHERE m.chat_id = c.id), c.created_at), \
                            c.updated_at) < $1",
        )
        .bind(cutoff)
        .fetch_all(&mut **self.tx()?)
        .await
        .map_err(db_err)
    }

    async fn add_membership(&mut self, membership: NewMembership) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO chat_memberships \
             (chat_id, user_id, user_role, is_primary_member, has_read_permission, \
              has_write_permission, first_available_message_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (chat_id, user_id) DO NOTHING",
        )
        .bind(membership.chat_id)
        .bind(membership.user_id)
        .bind(UserRoleDb::from(membership.user_role))
        .bind(membership.is_primary_member)
        .bind(membership.has_read_permission)
        .bind(membership.has_write_permission)
        .bind(membership.first_available_message_id)
        .execute(&mut **self.tx()?)
        .await
        .map_err(db_err)?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            self.bump_chat_version(membership.chat_id).await?;
        }
        Ok(inserted)
    }

    async fn get_membership(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
    ) -> StoreResult<Option<ChatMembership>> {
        let entity = sqlx::query_as::<_, ChatMembershipEntity>(&format!(
            "SELECT {} FROM chat_memberships WHERE chat_id = $1 AND user_id = $2",
            MEMBERSHIP_COLUMNS
        ))
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entity.map(ChatMembership::from))
    }

    async fn is_member(&mut self, chat_id: i64, user_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM chat_memberships \
             WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)
    }

    async fn list_members(&mut self, chat_id: i64) -> StoreResult<Vec<ChatMembership>> {
        let entities = sqlx::query_as::<_, ChatMembershipEntity>(&format!(
            "SELECT {} FROM chat_memberships WHERE chat_id = $1 ORDER BY joined_at",
            MEMBERSHIP_COLUMNS
        ))
        .bind(chat_id)
        .fetch_all(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entities.into_iter().map(ChatMembership::from).collect())
    }

    async fn set_read_progress(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
        message_id: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE chat_memberships SET \
             last_read_message_id = GREATEST(COALESCE(last_read_message_id, 0), $3), \
             last_received_message_id = GREATEST(COALESCE(last_received_message_id, 0), $3) \
             WHERE chat_id = $1 AND user_id = $2",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(message_id)
        .execute(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_received_progress(
        &mut self,
        chat_id: i64,
        user_id: Uuid,
        message_id: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE chat_memberships SET \
             last_received_message_id = GREATEST(COALESCE(last_received_message_id, 0), $3) \
             WHERE chat_id = $1 AND user_id = $2",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(message_id)
        .execute(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_message(
        &mut self,
        chat_id: i64,
        sender_id: Option<Uuid>,
        content: &MessageContent,
        reply_to: Option<i64>,
    ) -> StoreResult<Message> {
        let content = serde_json::to_value(content).map_err(json_err)?;
        let entity = sqlx::query_as::<_, MessageEntity>(&format!(
            "INSERT INTO messages (chat_id, sender_id, content, reply_to) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(chat_id)
        .bind(sender_id)
        .bind(content)
        .bind(reply_to)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        message_from(entity)
    }

    async fn get_message(&mut self, message_id: i64) -> StoreResult<Option<Message>> {
        let entity = sqlx::query_as::<_, MessageEntity>(&format!(
            "SELECT {} FROM messages WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        entity.map(message_from).transpose()
    }

    async fn last_message(&mut self, chat_id: i64) -> StoreResult<Option<Message>> {
        let entity = sqlx::query_as::<_, MessageEntity>(&format!(
            "SELECT {} FROM messages WHERE chat_id = $1 ORDER BY id DESC LIMIT 1",
            MESSAGE_COLUMNS
        ))
        .bind(chat_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        entity.map(message_from).transpose()
    }

    async fn first_message(&mut self, chat_id: i64) -> StoreResult<Option<Message>> {
        let entity = sqlx::query_as::<_, MessageEntity>(&format!(
            "SELECT {} FROM messages WHERE chat_id = $1 ORDER BY id ASC LIMIT 1",
            MESSAGE_COLUMNS
        ))
        .bind(chat_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        entity.map(message_from).transpose()
    }

    async fn list_messages(
        &mut self,
        chat_id: i64,
        before_id: Option<i64>,
        min_id: Option<i64>,
        max_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<Message>> {
        let entities = sqlx::query_as::<_, MessageEntity>(&format!(
            "SELECT {} FROM messages \
             WHERE chat_id = $1 \
               AND ($2::BIGINT IS NULL OR id < $2) \
               AND ($3::BIGINT IS NULL OR id >= $3) \
               AND ($4::BIGINT IS NULL OR id <= $4) \
             ORDER BY id DESC \
             LIMIT $5",
            MESSAGE_COLUMNS
        ))
        .bind(chat_id)
        .bind(before_id)
        .bind(min_id)
        .bind(max_id)
        .bind(limit)
        .fetch_all(&mut **self.tx()?)
        .await
        .map_err(db_err)?;

        entities.into_iter().map(message_from).collect()
    }

    async fn last_messages_for_chats(
        &mut self,
        chat_ids: &[i64],
    ) -> StoreResult<HashMap<i64, Message>> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // Most recent message by id per chat, one round trip for the page.
        let entities = sqlx::query_as::<_, MessageEntity>(&format!(
            "SELECT DISTINCT ON (chat_id) {} FROM messages \
             WHERE chat_id = ANY($1) \
             ORDER BY chat_id, id DESC",
            MESSAGE_COLUMNS
        ))
        .bind(chat_ids)
        .fetch_all(&mut **self.tx()?)
        .await
        .map_err(db_err)?;

        let mut out = HashMap::with_capacity(entities.len());
        for entity in entities {
            let message = message_from(entity)?;
            out.insert(message.chat_id, message);
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
        // Upsert per (message, recipient); a row missing from the delivery
        // table counts as SENT, and the WHERE clause keeps the upgrade
        // monotone and idempotent.
        let for_user = sqlx::query(
            "INSERT INTO message_delivery (message_id, user_id, status) \
             SELECT m.id, $3, $4 FROM messages m \
             WHERE m.chat_id = $1 AND m.id <= $2 \
               AND (m.sender_id IS NULL OR m.sender_id <> $3) \
             ON CONFLICT (message_id, user_id) DO UPDATE \
             SET status = EXCLUDED.status, updated_at = now() \
             WHERE message_delivery.status < EXCLUDED.status",
        )
        .bind(chat_id)
        .bind(up_to_message_id)
        .bind(user_id)
        .bind(status.as_i16())
        .execute(&mut **self.tx()?)
        .await
        .map_err(db_err)?
        .rows_affected();

        let mut total = for_user;
        if update_for_all {
            total += sqlx::query(
                "INSERT INTO message_delivery (message_id, user_id, status) \
                 SELECT m.id, cm.user_id, $4 FROM messages m \
                 JOIN chat_memberships cm ON cm.chat_id = m.chat_id \
                 WHERE m.chat_id = $1 AND m.id <= $2 \
                   AND cm.user_id <> $3 \
                   AND (m.sender_id IS NULL OR m.sender_id <> cm.user_id) \
                 ON CONFLICT (message_id, user_id) DO UPDATE \
                 SET status = EXCLUDED.status, updated_at = now() \
                 WHERE message_delivery.status < EXCLUDED.status",
            )
            .bind(chat_id)
            .bind(up_to_message_id)
            .bind(user_id)
            .bind(status.as_i16())
            .execute(&mut **self.tx()?)
            .await
            .map_err(db_err)?
            .rows_affected();
        }

        Ok((for_user, total))
    }

    async fn insert_ticket(&mut self, new: NewTicket) -> StoreResult<Ticket> {
        let entity = sqlx::query_as::<_, TicketEntity>(&format!(
            "INSERT INTO tickets (chat_id, created_by, created_from_chat_id, comment) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(new.chat_id)
        .bind(new.created_by)
        .bind(new.created_from_chat_id)
        .bind(new.comment)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DomainError::conflict("a ticket already exists for this chat")
            }
            _ => db_err(e),
        })?;
        Ok(entity.into())
    }

    async fn get_ticket(&mut self, ticket_id: i64) -> StoreResult<Option<Ticket>> {
        let entity = sqlx::query_as::<_, TicketEntity>(&format!(
            "SELECT {} FROM tickets WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entity.map(Ticket::from))
    }

    async fn get_ticket_by_chat_id(&mut self, chat_id: i64) -> StoreResult<Option<Ticket>> {
        let entity = sqlx::query_as::<_, TicketEntity>(&format!(
            "SELECT {} FROM tickets WHERE chat_id = $1",
            TICKET_COLUMNS
        ))
        .bind(chat_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entity.map(Ticket::from))
    }

    async fn set_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
    ) -> StoreResult<Ticket> {
        let entity = sqlx::query_as::<_, TicketEntity>(&format!(
            "UPDATE tickets SET status = $2, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .bind(TicketStatusDb::from(status))
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entity.into())
    }

    async fn assign_ticket(&mut self, ticket_id: i64, user_id: Uuid) -> StoreResult<Ticket> {
        let entity = sqlx::query_as::<_, TicketEntity>(&format!(
            "UPDATE tickets SET assigned_to_user_id = $2, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .bind(user_id)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entity.into())
    }

    async fn set_ticket_close_reason(
        &mut self,
        ticket_id: i64,
        close_reason: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE tickets SET close_reason = $2, updated_at = now() WHERE id = $1")
            .bind(ticket_id)
            .bind(close_reason)
            .execute(&mut **self.tx()?)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn ticket_exists_for_match(
        &mut self,
        user_id: Uuid,
        match_id: Uuid,
    ) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM tickets t \
             JOIN chats c ON c.id = t.chat_id \
             WHERE t.created_by = $1 AND c.match_id = $2 AND t.status <> 'confirmed')",
        )
        .bind(user_id)
        .bind(match_id)
        .fetch_one(&mut **self.tx()?)
        .await
        .map_err(db_err)
    }

    async fn get_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        let entity = sqlx::query_as::<_, UserEntity>(
            "SELECT id, role, display_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entity.map(User::from))
    }

    async fn get_match(&mut self, match_id: Uuid) -> StoreResult<Option<SportMatch>> {
        let entity = sqlx::query_as::<_, SportMatchEntity>(
            "SELECT id, name, is_active FROM matches WHERE id = $1",
        )
        .bind(match_id)
        .fetch_optional(&mut **self.tx()?)
        .await
        .map_err(db_err)?;
        Ok(entity.map(SportMatch::from))
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DomainError::internal("transaction already committed"))?;
        tx.commit().await.map_err(db_err)
    }
}
