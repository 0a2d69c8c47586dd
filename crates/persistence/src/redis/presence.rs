//! Presence lookup against the shared presence service.

use async_trait::async_trait;
use uuid::Uuid;

use domain::services::Presence;
use domain::DomainError;

use super::{get_connection, redis_err, RedisPool};

/// Online-user set maintained by the presence service under this key; the
/// messenger only reads it.
const ONLINE_SET_KEY: &str = "presence:online";

#[derive(Clone)]
pub struct RedisPresence {
    pool: RedisPool,
}

impl RedisPresence {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Presence for RedisPresence {
    async fn get_active_users(&self) -> Result<Vec<Uuid>, DomainError> {
        let mut conn = get_connection(&self.pool).await?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(ONLINE_SET_KEY)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        // Foreign entries in the set are skipped, not fatal.
        Ok(members
            .iter()
            .filter_map(|raw| match raw.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(entry = %raw, "Skipping malformed presence entry");
                    None
                }
            })
            .collect())
    }
}
