//! Sport match entity (database row mapping, read-only).

use domain::models::SportMatch;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the matches table. The table is owned by the
/// match-management service; the messenger only reads it.
#[derive(Debug, Clone, FromRow)]
pub struct SportMatchEntity {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

impl From<SportMatchEntity> for SportMatch {
    fn from(entity: SportMatchEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            is_active: entity.is_active,
        }
    }
}
