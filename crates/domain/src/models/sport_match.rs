//! Sporting match reference model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sporting match chats and tickets can be bound to. The messenger reads
/// matches only to gate ticket creation; match lifecycle is owned by the
/// scheduling subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SportMatch {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}
