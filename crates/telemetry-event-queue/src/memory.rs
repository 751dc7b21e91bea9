//! In-memory event store.

use crate::{EventStore, QueueResult, QueuedEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Event store that lives for the process lifetime only.
///
/// Records are kept in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<QueuedEvent>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert(&self, event: &QueuedEvent) -> QueueResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn load_all(&self) -> QueueResult<Vec<QueuedEvent>> {
        let mut events = self.events.lock().await.clone();
        // Stable sort keeps insertion order for equal timestamps.
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn record_failure(
        &self,
        id: &str,
        error: Option<&str>,
        attempted_at: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let mut events = self.events.lock().await;
        let Some(event) = events.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };

        event.retry_count = event.retry_count.saturating_add(1);
        event.last_attempt_at = Some(attempted_at);
        if let Some(error) = error {
            event.reason = Some(error.to_string());
        }
        Ok(true)
    }

    async fn remove(&self, id: &str) -> QueueResult<bool> {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|e| e.id != id);
        Ok(events.len() < before)
    }

    async fn remove_expired(
        &self,
        max_retries: u32,
        created_before: DateTime<Utc>,
    ) -> QueueResult<usize> {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|e| e.retry_count < max_retries && e.timestamp >= created_before);
        Ok(before - events.len())
    }

    async fn remove_oldest_beyond(&self, cap: usize) -> QueueResult<usize> {
        let mut events = self.events.lock().await;
        if events.len() <= cap {
            return Ok(0);
        }

        events.sort_by_key(|e| e.timestamp);
        let excess = events.len() - cap;
        events.drain(..excess);
        Ok(excess)
    }

    async fn count(&self) -> QueueResult<usize> {
        Ok(self.events.lock().await.len())
    }
}
