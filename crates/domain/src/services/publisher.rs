//! Event publisher boundary: best-effort fan-out of service updates.
//!
//! Publishing never participates in the success or failure of the storage
//! transaction. Controllers publish only after `commit()` has returned,
//! log a warning on failure and move on.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::ServiceEvent;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// One delivery attempt; returns false when the event could not be
    /// handed to the bus (or nobody was listening). Callers log and
    /// discard the result.
    async fn publish(&self, event: &ServiceEvent) -> bool;
}

/// Publishes a batch post-commit, logging failures as warnings.
pub async fn publish_all(publisher: &dyn EventPublisher, events: &[ServiceEvent]) {
    for event in events {
        if !publisher.publish(event).await {
            tracing::warn!(topic = event.topic(), "service update not delivered");
        }
    }
}

/// Mock publisher recording every event, for tests.
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    events: Mutex<Vec<ServiceEvent>>,
    /// Simulate a dead bus: publish returns false but still records.
    pub fail: bool,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ServiceEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event: &ServiceEvent) -> bool {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(event.clone());
        !self.fail
    }
}
