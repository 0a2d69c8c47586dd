//! Inactive chat auto-closer background job.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use domain::storage::MessengerStore;
use persistence::PgStore;

use super::scheduler::{Job, JobFrequency};

/// Closes open PERSONAL and MATCH chats with no message activity for the
/// configured number of hours. Ticket chats follow the ticket lifecycle
/// and are never auto-closed.
pub struct CloseInactiveChatsJob {
    pool: PgPool,
    inactivity_hours: u32,
    interval_minutes: u64,
}

impl CloseInactiveChatsJob {
    pub fn new(pool: PgPool, inactivity_hours: u32, interval_minutes: u64) -> Self {
        Self {
            pool,
            inactivity_hours,
            interval_minutes,
        }
    }

    async fn close_inactive(&self) -> Result<u64, domain::error::DomainError> {
        let cutoff = Utc::now() - Duration::hours(self.inactivity_hours as i64);

        let mut store = PgStore::begin(&self.pool).await?;
        let chat_ids = store.list_inactive_open_chats(cutoff).await?;
        let closed = chat_ids.len() as u64;

        for chat_id in chat_ids {
            store.set_chat_closed(chat_id, true).await?;
        }
        store.commit().await?;

        Ok(closed)
    }
}

#[async_trait::async_trait]
impl Job for CloseInactiveChatsJob {
    fn name(&self) -> &'static str {
        "close_inactive_chats"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let closed = self
            .close_inactive()
            .await
            .map_err(|e| format!("Failed to close inactive chats: {}", e))?;

        if closed > 0 {
            info!(
                closed,
                inactivity_hours = self.inactivity_hours,
                "Closed inactive chats"
            );
        }

        Ok(())
    }
}
