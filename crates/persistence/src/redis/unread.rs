//! Redis-backed unread counters.
//!
//! Counts are keyed by `unread:{user_id}:{chat_id}`. Multi-key adjustments
//! run as a single Lua script so the whole batch applies atomically in one
//! round trip; decrements floor each counter at zero.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use domain::storage::{StoreResult, UnreadCounterStore};

use super::{get_connection, redis_err, RedisPool};

const INCR_SCRIPT: &str = r#"
for i, key in ipairs(KEYS) do
    redis.call('INCRBY', key, ARGV[1])
end
return 0
"#;

const DECR_SCRIPT: &str = r#"
for i, key in ipairs(KEYS) do
    local value = redis.call('DECRBY', key, ARGV[1])
    if value < 0 then
        redis.call('SET', key, 0)
    end
end
return 0
"#;

#[derive(Clone)]
pub struct RedisUnreadCounters {
    pool: RedisPool,
}

impl RedisUnreadCounters {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn key(user_id: Uuid, chat_id: i64) -> String {
        format!("unread:{}:{}", user_id, chat_id)
    }
}

#[async_trait]
impl UnreadCounterStore for RedisUnreadCounters {
    async fn get(&self, user_id: Uuid, chat_id: i64) -> StoreResult<i64> {
        let mut conn = get_connection(&self.pool).await?;
        let value: Option<i64> = redis::cmd("GET")
            .arg(Self::key(user_id, chat_id))
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(value.unwrap_or(0))
    }

    async fn get_many(
        &self,
        user_id: Uuid,
        chat_ids: &[i64],
    ) -> StoreResult<HashMap<i64, i64>> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = get_connection(&self.pool).await?;
        let mut cmd = redis::cmd("MGET");
        for chat_id in chat_ids {
            cmd.arg(Self::key(user_id, *chat_id));
        }
        let values: Vec<Option<i64>> = cmd.query_async(&mut conn).await.map_err(redis_err)?;

        Ok(chat_ids
            .iter()
            .zip(values)
            .map(|(chat_id, value)| (*chat_id, value.unwrap_or(0)))
            .collect())
    }

    async fn set(&self, user_id: Uuid, chat_id: i64, value: i64) -> StoreResult<()> {
        let mut conn = get_connection(&self.pool).await?;
        redis::cmd("SET")
            .arg(Self::key(user_id, chat_id))
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)
    }

    async fn clean(&self, user_id: Uuid, chat_id: i64) -> StoreResult<()> {
        let mut conn = get_connection(&self.pool).await?;
        redis::cmd("DEL")
            .arg(Self::key(user_id, chat_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)
    }

    async fn increment_many(&self, keys: &[(Uuid, i64)], delta: i64) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = get_connection(&self.pool).await?;
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(INCR_SCRIPT).arg(keys.len());
        for (user_id, chat_id) in keys {
            cmd.arg(Self::key(*user_id, *chat_id));
        }
        cmd.arg(delta);
        cmd.query_async::<i64>(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn decrement_many(&self, keys: &[(Uuid, i64)], delta: i64) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = get_connection(&self.pool).await?;
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(DECR_SCRIPT).arg(keys.len());
        for (user_id, chat_id) in keys {
            cmd.arg(Self::key(*user_id, *chat_id));
        }
        cmd.arg(delta);
        cmd.query_async::<i64>(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}
