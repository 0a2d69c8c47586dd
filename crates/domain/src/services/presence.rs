//! Presence boundary: which users are currently online.
//!
//! Consumed read-only to annotate member lists; staleness is tolerated
//! (the presence tracker is eventually consistent).

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;

#[async_trait]
pub trait Presence: Send + Sync {
    async fn get_active_users(&self) -> Result<Vec<Uuid>, DomainError>;
}

/// Mock presence tracker for tests.
#[derive(Debug, Default)]
pub struct MockPresence {
    online: Mutex<HashSet<Uuid>>,
}

impl MockPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, user_id: Uuid) {
        self.online
            .lock()
            .expect("presence lock poisoned")
            .insert(user_id);
    }

    pub fn set_offline(&self, user_id: Uuid) {
        self.online
            .lock()
            .expect("presence lock poisoned")
            .remove(&user_id);
    }
}

#[async_trait]
impl Presence for MockPresence {
    async fn get_active_users(&self) -> Result<Vec<Uuid>, DomainError> {
        Ok(self
            .online
            .lock()
            .expect("presence lock poisoned")
            .iter()
            .copied()
            .collect())
    }
}
