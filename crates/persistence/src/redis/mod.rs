//! Redis-backed services: unread counters, presence lookup and the pub/sub
//! event publisher.

pub mod presence;
pub mod publisher;
pub mod unread;

use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::Client;

use domain::DomainError;

pub use presence::RedisPresence;
pub use publisher::RedisEventPublisher;
pub use unread::RedisUnreadCounters;

pub type RedisPool = Arc<Client>;

/// Redis configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Creates the shared Redis client and verifies connectivity with a PING.
pub async fn create_pool(config: &RedisConfig) -> Result<RedisPool, DomainError> {
    tracing::info!(url = %crate::db::mask_url(&config.url), "Connecting to Redis");

    let client = Client::open(config.url.as_str())
        .map_err(|e| DomainError::Storage(format!("invalid Redis URL: {}", e)))?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(redis_err)?;
    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(redis_err)?;

    Ok(Arc::new(client))
}

pub(crate) async fn get_connection(pool: &RedisPool) -> Result<MultiplexedConnection, DomainError> {
    pool.get_multiplexed_async_connection()
        .await
        .map_err(redis_err)
}

pub(crate) fn redis_err(err: redis::RedisError) -> DomainError {
    DomainError::Storage(format!("Redis error: {}", err))
}
