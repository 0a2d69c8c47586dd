//! Redis pub/sub event publisher.

use async_trait::async_trait;

use domain::models::ServiceEvent;
use domain::services::EventPublisher;

use super::{get_connection, RedisPool};

/// Publishes service updates on Redis pub/sub channels, one channel per
/// event topic. Best-effort: a publish with no subscribers (or a transport
/// failure) reports false and the caller logs it; the committed state is
/// unaffected either way.
#[derive(Clone)]
pub struct RedisEventPublisher {
    pool: RedisPool,
}

impl RedisEventPublisher {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: &ServiceEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(topic = event.topic(), error = %e, "Failed to encode event");
                return false;
            }
        };

        let mut conn = match get_connection(&self.pool).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(topic = event.topic(), error = %e, "Redis unavailable for publish");
                return false;
            }
        };

        // PUBLISH returns the number of subscribers that received it.
        match redis::cmd("PUBLISH")
            .arg(event.topic())
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
        {
            Ok(receivers) => receivers > 0,
            Err(e) => {
                tracing::error!(topic = event.topic(), error = %e, "Failed to publish event");
                false
            }
        }
    }
}
