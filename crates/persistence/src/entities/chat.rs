//! Chat and chat membership entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::models::{Chat, ChatMembership, ChatMeta, ChatType};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::UserRoleDb;

/// Database enum for chat_type that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "chat_type", rename_all = "lowercase")]
pub enum ChatTypeDb {
    Personal,
    Match,
    Ticket,
}

impl From<ChatTypeDb> for ChatType {
    fn from(db_type: ChatTypeDb) -> Self {
        match db_type {
            ChatTypeDb::Personal => ChatType::Personal,
            ChatTypeDb::Match => ChatType::Match,
            ChatTypeDb::Ticket => ChatType::Ticket,
        }
    }
}

impl From<ChatType> for ChatTypeDb {
    fn from(chat_type: ChatType) -> Self {
        match chat_type {
            ChatType::Personal => ChatTypeDb::Personal,
            ChatType::Match => ChatTypeDb::Match,
            ChatType::Ticket => ChatTypeDb::Ticket,
        }
    }
}

/// Database row mapping for the chats table. The meta column is JSONB.
#[derive(Debug, Clone, FromRow)]
pub struct ChatEntity {
    pub id: i64,
    pub chat_type: ChatTypeDb,
    pub match_id: Option<Uuid>,
    pub is_closed: bool,
    pub meta: serde_json::Value,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ChatEntity> for Chat {
    type Error = serde_json::Error;

    fn try_from(entity: ChatEntity) -> Result<Self, Self::Error> {
        let meta: ChatMeta = serde_json::from_value(entity.meta)?;
        Ok(Self {
            id: entity.id,
            chat_type: entity.chat_type.into(),
            match_id: entity.match_id,
            is_closed: entity.is_closed,
            meta,
            version: entity.version,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

/// Database row mapping for the chat_memberships table.
#[derive(Debug, Clone, FromRow)]
pub struct ChatMembershipEntity {
    pub chat_id: i64,
    pub user_id: Uuid,
    pub user_role: UserRoleDb,
    pub is_primary_member: bool,
    pub has_read_permission: bool,
    pub has_write_permission: bool,
    pub last_read_message_id: Option<i64>,
    pub last_received_message_id: Option<i64>,
    pub first_available_message_id: Option<i64>,
    pub last_available_message_id: Option<i64>,
    pub is_archive_member: bool,
    pub joined_at: DateTime<Utc>,
}

impl From<ChatMembershipEntity> for ChatMembership {
    fn from(entity: ChatMembershipEntity) -> Self {
        Self {
            chat_id: entity.chat_id,
            user_id: entity.user_id,
            user_role: entity.user_role.into(),
            is_primary_member: entity.is_primary_member,
            has_read_permission: entity.has_read_permission,
            has_write_permission: entity.has_write_permission,
            last_read_message_id: entity.last_read_message_id,
            last_received_message_id: entity.last_received_message_id,
            first_available_message_id: entity.first_available_message_id,
            last_available_message_id: entity.last_available_message_id,
            is_archive_member: entity.is_archive_member,
            joined_at: entity.joined_at,
        }
    }
}
