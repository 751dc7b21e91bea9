//! Policy-aware queue of events awaiting redelivery.

use crate::{
    EventStore, MemoryStore, QueueMetadata, QueueResult, QueuedEvent, SqliteStore, TelemetryEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use telemetry_config_and_utils::{Paths, QueueSettings};
use tracing::{debug, info, warn};

/// Queue operations a retry scheduler depends on.
///
/// None of these fail the caller: telemetry storage faults are logged
/// and degrade to an empty or zero result.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Persist a failed event and return its new ID.
    async fn enqueue(&self, event: TelemetryEvent, reason: Option<String>) -> String;

    /// Events currently eligible for another attempt, oldest first.
    async fn get_events_for_retry(&self) -> Vec<QueuedEvent>;

    /// Record the outcome of an attempt. Unknown IDs are ignored.
    async fn update_event_after_retry(&self, id: &str, success: bool, error: Option<String>);

    /// Drop events past the retry, age or size limits. Returns how many.
    async fn prune_failed_events(&self) -> usize;

    /// Current size and backpressure flag.
    async fn get_queue_metadata(&self) -> QueueMetadata;
}

/// Retention and backoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Failed attempts after which an event is pruned.
    pub max_retries: u32,
    /// Age after which an event is pruned.
    pub max_age: Duration,
    /// Size above which `is_above_warning_threshold` is set.
    pub warning_threshold: usize,
    /// Hard ceiling enforced by pruning the oldest events.
    pub max_queue_size: usize,
    /// Backoff after the first failed attempt.
    pub backoff_base: Duration,
    /// Maximum backoff.
    pub backoff_max: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::from(&QueueSettings::default())
    }
}

impl From<&QueueSettings> for QueuePolicy {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            max_age: Duration::from_secs(settings.max_age_secs),
            warning_threshold: settings.warning_threshold,
            max_queue_size: settings.max_queue_size,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }
}

/// Durable store of events that failed to send.
///
/// Owns retry bookkeeping and eligibility; it never schedules anything.
pub struct EventQueue {
    store: Arc<dyn EventStore>,
    policy: QueuePolicy,
}

impl EventQueue {
    /// Create a queue over an existing store.
    pub fn new(store: Arc<dyn EventStore>, policy: QueuePolicy) -> Self {
        Self { store, policy }
    }

    /// Create a queue that is lost when the process exits.
    pub fn in_memory(policy: QueuePolicy) -> Self {
        Self::new(Arc::new(MemoryStore::new()), policy)
    }

    /// Open the SQLite-backed queue under the given paths.
    pub async fn open(paths: &Paths, policy: QueuePolicy) -> QueueResult<Self> {
        let store = SqliteStore::open(&paths.queue_database_file()).await?;
        Ok(Self::new(Arc::new(store), policy))
    }

    /// Get the active policy.
    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    fn events_due_at(&self, events: Vec<QueuedEvent>, now: DateTime<Utc>) -> Vec<QueuedEvent> {
        events
            .into_iter()
            .filter(|e| e.retry_count < self.policy.max_retries)
            .filter(|e| is_event_due(e.last_attempt_at, e.retry_count, now, &self.policy))
            .collect()
    }

    async fn prune_at(&self, now: DateTime<Utc>) -> QueueResult<usize> {
        let max_age = chrono::Duration::from_std(self.policy.max_age)
            .unwrap_or(chrono::Duration::MAX);
        let cutoff = now
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let expired = self
            .store
            .remove_expired(self.policy.max_retries, cutoff)
            .await?;
        let overflow = self
            .store
            .remove_oldest_beyond(self.policy.max_queue_size)
            .await?;

        if overflow > 0 {
            warn!(
                count = overflow,
                max_queue_size = self.policy.max_queue_size,
                "Retry queue over capacity, dropped oldest events"
            );
        }
        Ok(expired + overflow)
    }
}

#[async_trait]
impl RetryQueue for EventQueue {
    async fn enqueue(&self, event: TelemetryEvent, reason: Option<String>) -> String {
        let queued = QueuedEvent::new(event, reason);
        let id = queued.id.clone();

        match self.store.insert(&queued).await {
            Ok(()) => debug!(
                event_id = %id,
                event_name = %queued.event.name,
                reason = queued.reason.as_deref().unwrap_or(""),
                "Queued failed telemetry event"
            ),
            Err(e) => warn!(
                event_id = %id,
                event_name = %queued.event.name,
                error = %e,
                "Failed to persist telemetry event, dropping it"
            ),
        }
        id
    }

    async fn get_events_for_retry(&self) -> Vec<QueuedEvent> {
        match self.store.load_all().await {
            Ok(events) => self.events_due_at(events, Utc::now()),
            Err(e) => {
                warn!(error = %e, "Failed to read retry queue");
                Vec::new()
            }
        }
    }

    async fn update_event_after_retry(&self, id: &str, success: bool, error: Option<String>) {
        let result = if success {
            self.store.remove(id).await
        } else {
            self.store
                .record_failure(id, error.as_deref(), Utc::now())
                .await
        };

        match result {
            Ok(true) => debug!(event_id = %id, success, "Recorded retry outcome"),
            Ok(false) => debug!(event_id = %id, "Retry outcome for unknown event ignored"),
            Err(e) => warn!(event_id = %id, success, error = %e, "Failed to record retry outcome"),
        }
    }

    async fn prune_failed_events(&self) -> usize {
        match self.prune_at(Utc::now()).await {
            Ok(0) => 0,
            Ok(count) => {
                info!(count, "Pruned telemetry events from retry queue");
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to prune retry queue");
                0
            }
        }
    }

    async fn get_queue_metadata(&self) -> QueueMetadata {
        let size = match self.store.count().await {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "Failed to count retry queue");
                0
            }
        };

        QueueMetadata {
            size,
            is_above_warning_threshold: size > self.policy.warning_threshold,
        }
    }
}

/// Determines if an event is due for another attempt.
///
/// An event is due if it has never failed a retry, or if the backoff for
/// its retry count has elapsed since the last attempt.
fn is_event_due(
    last_attempt_at: Option<DateTime<Utc>>,
    retry_count: u32,
    now: DateTime<Utc>,
    policy: &QueuePolicy,
) -> bool {
    let Some(last_attempt) = last_attempt_at else {
        return true;
    };

    let backoff = chrono::Duration::from_std(compute_backoff(retry_count, policy))
        .unwrap_or(chrono::Duration::MAX);
    match last_attempt.checked_add_signed(backoff) {
        Some(due_at) => now >= due_at,
        None => false,
    }
}

/// Computes the exponential backoff for a given retry count.
///
/// `delay = base * 2^(retry_count - 1)`, capped at `backoff_max`.
///
/// | Retry Count | Delay (base=30s, max=30m) |
/// |-------------|---------------------------|
/// | 0           | 0s                        |
/// | 1           | 30s                       |
/// | 2           | 60s                       |
/// | 3           | 120s                      |
/// | 7+          | 30m (capped)              |
pub fn compute_backoff(retry_count: u32, policy: &QueuePolicy) -> Duration {
    if retry_count == 0 {
        return Duration::ZERO;
    }

    let shift = retry_count - 1;
    let multiplier = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
    policy
        .backoff_base
        .saturating_mul(multiplier)
        .min(policy.backoff_max)
}
