//! Ticket domain models and the workflow state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Ticket workflow state.
///
/// Legal paths: `New -> InProgress -> Solved -> {Confirmed | InProgress}`.
/// A ticket may cycle Solved -> InProgress (reopen) any number of times;
/// Confirmed is terminal. Transitions are driven only through the tickets
/// controller, never by direct storage writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    Solved,
    Confirmed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Solved => "solved",
            TicketStatus::Confirmed => "confirmed",
        }
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::New, TicketStatus::InProgress)
                | (TicketStatus::New, TicketStatus::Solved)
                | (TicketStatus::InProgress, TicketStatus::Solved)
                | (TicketStatus::Solved, TicketStatus::Confirmed)
                | (TicketStatus::Solved, TicketStatus::InProgress)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Confirmed)
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(TicketStatus::New),
            "in_progress" => Ok(TicketStatus::InProgress),
            "solved" => Ok(TicketStatus::Solved),
            "confirmed" => Ok(TicketStatus::Confirmed),
            _ => Err(format!("Invalid ticket status: {}", s)),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A support/escalation workflow bound 1:1 to a dedicated chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Ticket {
    pub id: i64,
    pub chat_id: i64,
    pub created_by: Uuid,
    /// The chat that spawned the ticket, if any.
    pub created_from_chat_id: Option<i64>,
    /// Null until a supervisor takes the ticket into work.
    pub assigned_to_user_id: Option<Uuid>,
    pub status: TicketStatus,
    pub comment: Option<String>,
    pub close_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating a ticket.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateTicketRequest {
    /// The literal user-supplied message posted alongside the ticket.
    #[validate(length(min = 1, max = 4000, message = "Message must be between 1 and 4000 characters"))]
    pub message: String,

    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,

    /// Source chat the ticket is escalated from, when present.
    pub created_from_chat_id: Option<i64>,
}

/// Request payload for closing a ticket.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CloseTicketRequest {
    #[validate(length(max = 1000, message = "Close reason must be at most 1000 characters"))]
    pub close_reason: Option<String>,
}
