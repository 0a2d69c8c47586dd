//! Message entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Message, MessageContent};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the messages table. The content column is a
/// JSONB tagged union (see [`MessageContent`]).
#[derive(Debug, Clone, FromRow)]
pub struct MessageEntity {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: Option<Uuid>,
    pub content: serde_json::Value,
    pub reply_to: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MessageEntity> for Message {
    type Error = serde_json::Error;

    fn try_from(entity: MessageEntity) -> Result<Self, Self::Error> {
        let content: MessageContent = serde_json::from_value(entity.content)?;
        Ok(Self {
            id: entity.id,
            chat_id: entity.chat_id,
            sender_id: entity.sender_id,
            content,
            reply_to: entity.reply_to,
            created_at: entity.created_at,
        })
    }
}
