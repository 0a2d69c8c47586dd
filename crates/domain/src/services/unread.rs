//! Unread counters controller.
//!
//! Maintains per-(user, chat) unread tallies with match-level aggregation
//! derived by summing the chats of a match. The underlying store provides
//! the atomic multi-key increment/decrement primitive, so concurrent
//! message arrivals and read-acks never interleave inconsistently.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::DomainError;
use crate::storage::{MessengerStore, UnreadCounterStore};

#[derive(Clone)]
pub struct UnreadCountersController {
    store: Arc<dyn UnreadCounterStore>,
}

impl UnreadCountersController {
    pub fn new(store: Arc<dyn UnreadCounterStore>) -> Self {
        Self { store }
    }

    pub async fn get_for_chat(&self, user_id: Uuid, chat_id: i64) -> Result<i64, DomainError> {
        self.store.get(user_id, chat_id).await
    }

    pub async fn get_for_chats(
        &self,
        user_id: Uuid,
        chat_ids: &[i64],
    ) -> Result<HashMap<i64, i64>, DomainError> {
        self.store.get_many(user_id, chat_ids).await
    }

    /// Aggregate unread across every chat of a match.
    pub async fn get_for_match<S: MessengerStore>(
        &self,
        store: &mut S,
        user_id: Uuid,
        match_id: Uuid,
    ) -> Result<i64, DomainError> {
        let chat_ids = store.list_chat_ids_for_match(match_id).await?;
        let counts = self.store.get_many(user_id, &chat_ids).await?;
        Ok(counts.values().sum())
    }

    pub async fn set(&self, user_id: Uuid, chat_id: i64, value: i64) -> Result<(), DomainError> {
        self.store.set(user_id, chat_id, value).await
    }

    /// Zeroes the counter for one (user, chat).
    pub async fn clean(&self, user_id: Uuid, chat_id: i64) -> Result<(), DomainError> {
        self.store.clean(user_id, chat_id).await
    }

    /// Atomic +delta over the given (user, chat) keys in one round trip.
    pub async fn increment_many(
        &self,
        keys: &[(Uuid, i64)],
        delta: i64,
    ) -> Result<(), DomainError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.store.increment_many(keys, delta).await
    }

    /// Atomic -delta, flooring each counter at 0.
    pub async fn decrement_many(
        &self,
        keys: &[(Uuid, i64)],
        delta: i64,
    ) -> Result<(), DomainError> {
        if keys.is_empty() || delta == 0 {
            return Ok(());
        }
        self.store.decrement_many(keys, delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMeta, ChatType};
    use crate::storage::{MemoryStore, MemoryUnreadCounters};

    #[tokio::test]
    async fn test_match_aggregation_sums_chats() {
        let mut store = MemoryStore::new();
        let counters = UnreadCountersController::new(Arc::new(MemoryUnreadCounters::new()));
        let user = Uuid::new_v4();
        let match_id = Uuid::new_v4();

        let a = store
            .create_chat(ChatType::Match, Some(match_id), ChatMeta::default())
            .await
            .unwrap();
        let b = store
            .create_chat(ChatType::Ticket, Some(match_id), ChatMeta::default())
            .await
            .unwrap();
        let unrelated = store
            .create_chat(ChatType::Match, Some(Uuid::new_v4()), ChatMeta::default())
            .await
            .unwrap();

        counters.set(user, a.id, 3).await.unwrap();
        counters.set(user, b.id, 2).await.unwrap();
        counters.set(user, unrelated.id, 9).await.unwrap();

        let total = counters
            .get_for_match(&mut store, user, match_id)
            .await
            .unwrap();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let counters = UnreadCountersController::new(Arc::new(MemoryUnreadCounters::new()));
        let user = Uuid::new_v4();

        counters.set(user, 1, 2).await.unwrap();
        counters.decrement_many(&[(user, 1)], 5).await.unwrap();
        assert_eq!(counters.get_for_chat(user, 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clean_zeroes_counter() {
        let counters = UnreadCountersController::new(Arc::new(MemoryUnreadCounters::new()));
        let user = Uuid::new_v4();

        counters.increment_many(&[(user, 7)], 4).await.unwrap();
        assert_eq!(counters.get_for_chat(user, 7).await.unwrap(), 4);

        counters.clean(user, 7).await.unwrap();
        assert_eq!(counters.get_for_chat(user, 7).await.unwrap(), 0);
    }
}
