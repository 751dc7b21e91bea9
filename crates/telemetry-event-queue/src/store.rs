//! Storage seam for queued events.

use crate::{QueueResult, QueuedEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistent backing store for [`EventQueue`](crate::EventQueue).
///
/// Implementations own the on-disk format. Records that cannot be decoded
/// must be skipped (and may be dropped) by `load_all` rather than failing
/// the whole read.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new record.
    async fn insert(&self, event: &QueuedEvent) -> QueueResult<()>;

    /// Load every record, oldest first by timestamp then insertion order.
    async fn load_all(&self) -> QueueResult<Vec<QueuedEvent>>;

    /// Increment the retry count of a record and stamp the attempt.
    ///
    /// `error` replaces the stored reason when present. Returns `false`
    /// if no record has this ID.
    async fn record_failure(
        &self,
        id: &str,
        error: Option<&str>,
        attempted_at: DateTime<Utc>,
    ) -> QueueResult<bool>;

    /// Remove a record. Returns `false` if no record has this ID.
    async fn remove(&self, id: &str) -> QueueResult<bool>;

    /// Remove records with `retry_count >= max_retries` or a timestamp
    /// before `created_before`.
    async fn remove_expired(
        &self,
        max_retries: u32,
        created_before: DateTime<Utc>,
    ) -> QueueResult<usize>;

    /// Remove the oldest records so that at most `cap` remain.
    async fn remove_oldest_beyond(&self, cap: usize) -> QueueResult<usize>;

    /// Number of stored records.
    async fn count(&self) -> QueueResult<usize>;
}
