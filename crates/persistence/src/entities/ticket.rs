//! Ticket entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Ticket, TicketStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for ticket_status that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
pub enum TicketStatusDb {
    New,
    InProgress,
    Solved,
    Confirmed,
}

impl From<TicketStatusDb> for TicketStatus {
    fn from(db_status: TicketStatusDb) -> Self {
        match db_status {
            TicketStatusDb::New => TicketStatus::New,
            TicketStatusDb::InProgress => TicketStatus::InProgress,
            TicketStatusDb::Solved => TicketStatus::Solved,
            TicketStatusDb::Confirmed => TicketStatus::Confirmed,
        }
    }
}

impl From<TicketStatus> for TicketStatusDb {
    fn from(status: TicketStatus) -> Self {
        match status {
            TicketStatus::New => TicketStatusDb::New,
            TicketStatus::InProgress => TicketStatusDb::InProgress,
            TicketStatus::Solved => TicketStatusDb::Solved,
            TicketStatus::Confirmed => TicketStatusDb::Confirmed,
        }
    }
}

/// Database row mapping for the tickets table.
#[derive(Debug, Clone, FromRow)]
pub struct TicketEntity {
    pub id: i64,
    pub chat_id: i64,
    pub created_by: Uuid,
    pub created_from_chat_id: Option<i64>,
    pub assigned_to_user_id: Option<Uuid>,
    pub status: TicketStatusDb,
    pub comment: Option<String>,
    pub close_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TicketEntity> for Ticket {
    fn from(entity: TicketEntity) -> Self {
        Self {
            id: entity.id,
            chat_id: entity.chat_id,
            created_by: entity.created_by,
            created_from_chat_id: entity.created_from_chat_id,
            assigned_to_user_id: entity.assigned_to_user_id,
            status: entity.status.into(),
            comment: entity.comment,
            close_reason: entity.close_reason,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
