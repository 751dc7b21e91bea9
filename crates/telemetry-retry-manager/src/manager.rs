//! Retry manager: schedules redelivery of queued telemetry.
//!
//! A running manager owns one worker task that multiplexes two tickers:
//!
//! - **retry**: fires immediately on start, then every `retry_interval`,
//!   and runs a processing cycle over the queue.
//! - **heartbeat**: fires every `retry_interval * heartbeat_multiplier` and
//!   sends a `CONNECTION_CHECK` probe, so recovery is noticed even when
//!   the queue is empty.
//!
//! A processing cycle never overlaps another one. Scheduled ticks skip
//! while a cycle is in flight; [`RetryManager::trigger_retry`] waits for it.

use crate::{
    ConnectionStatusCallback, EventSender, QueueSizeCallback, RetryManagerConfig, RetryResult,
};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use telemetry_config_and_utils::Paths;
use telemetry_event_queue::{EventQueue, QueueMetadata, QueuePolicy, RetryQueue, TelemetryEvent};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to the spawned worker of a running manager.
struct Worker {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// State shared between the manager handle and its worker task.
struct Inner {
    queue: Arc<dyn RetryQueue>,
    sender: Arc<dyn EventSender>,
    batch_size: usize,
    connected: AtomicBool,
    cycle_lock: tokio::sync::Mutex<()>,
    last_published: Mutex<Option<QueueMetadata>>,
    on_connection_status_change: ConnectionStatusCallback,
    on_queue_size_change: QueueSizeCallback,
}

/// Drives periodic redelivery of failed telemetry events.
///
/// # Lifecycle
///
/// 1. Create with [`RetryManager::new()`]
/// 2. Call [`RetryManager::start()`] from within a Tokio runtime
/// 3. Report failures with [`RetryManager::queue_failed_event()`]
/// 4. Call [`RetryManager::stop()`] (or drop the manager) to stop scheduling
pub struct RetryManager {
    inner: Arc<Inner>,
    retry_interval: Duration,
    heartbeat_interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl RetryManager {
    /// Create a stopped manager.
    ///
    /// Fails if the interval, batch size or heartbeat multiplier is zero.
    pub fn new(
        queue: Arc<dyn RetryQueue>,
        sender: Arc<dyn EventSender>,
        config: RetryManagerConfig,
    ) -> RetryResult<Self> {
        config.validate()?;

        Ok(Self {
            retry_interval: config.retry_interval,
            heartbeat_interval: config.heartbeat_interval(),
            inner: Arc::new(Inner {
                queue,
                sender,
                batch_size: config.batch_size,
                connected: AtomicBool::new(true),
                cycle_lock: tokio::sync::Mutex::new(()),
                last_published: Mutex::new(None),
                on_connection_status_change: config.on_connection_status_change,
                on_queue_size_change: config.on_queue_size_change,
            }),
            worker: Mutex::new(None),
        })
    }

    /// Create a manager over the SQLite-backed queue under `paths`.
    pub async fn with_sqlite_queue(
        paths: &Paths,
        policy: QueuePolicy,
        sender: Arc<dyn EventSender>,
        config: RetryManagerConfig,
    ) -> RetryResult<Self> {
        config.validate()?;
        let queue = EventQueue::open(paths, policy).await?;
        Self::new(Arc::new(queue), sender, config)
    }

    /// Start scheduling retry cycles and connection checks.
    ///
    /// The first cycle runs on the spawned task, not on the caller.
    /// Calling this while already running has no effect.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.task.is_finished()) {
            debug!("Retry manager already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_worker(
            self.inner.clone(),
            self.retry_interval,
            self.heartbeat_interval,
            shutdown_rx,
        ));
        *worker = Some(Worker { shutdown_tx, task });

        info!(
            retry_interval_ms = self.retry_interval.as_millis() as u64,
            heartbeat_interval_ms = self.heartbeat_interval.as_millis() as u64,
            batch_size = self.inner.batch_size,
            "Retry manager started"
        );
    }

    /// Stop scheduling. A cycle already in flight runs to completion.
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            // The worker may already have exited; nothing to signal then.
            let _ = worker.shutdown_tx.send(());
            info!("Retry manager stopped");
        }
    }

    /// Whether the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.task.is_finished())
    }

    /// Persist an event whose primary send failed.
    ///
    /// Marks the connection as down and publishes the new queue size
    /// right away instead of waiting for the next cycle.
    pub async fn queue_failed_event(&self, event: TelemetryEvent, reason: Option<String>) {
        let event_name = event.name.clone();
        let id = self.inner.queue.enqueue(event, reason).await;
        debug!(event_id = %id, event_name = %event_name, "Failed telemetry event queued for retry");

        self.inner.connected.store(false, Ordering::SeqCst);
        (self.inner.on_connection_status_change)(false);

        let metadata = self.inner.queue.get_queue_metadata().await;
        self.inner.publish_queue_size(metadata);
    }

    /// Run one full processing cycle now, whether or not the manager is started.
    ///
    /// Waits for a cycle already in flight instead of overlapping it.
    pub async fn trigger_retry(&self) {
        info!("Manual retry triggered");
        self.inner.run_cycle().await;
    }

    /// Last known connection status; `true` until a failure is observed.
    pub fn connection_status(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    retry_interval: Duration,
    heartbeat_interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut retry_ticker = interval(retry_interval);
    retry_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut heartbeat_ticker = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    heartbeat_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Also resolves when the manager is dropped.
            _ = &mut shutdown => {
                debug!("Retry worker received shutdown signal");
                break;
            }
            _ = retry_ticker.tick() => {
                inner.run_scheduled_cycle().await;
            }
            _ = heartbeat_ticker.tick() => {
                inner.check_connection().await;
            }
        }
    }

    debug!("Retry worker stopped");
}

impl Inner {
    async fn run_scheduled_cycle(&self) {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            debug!("Retry cycle already in progress, skipping tick");
            return;
        };
        self.process_queue().await;
    }

    async fn run_cycle(&self) {
        let _guard = self.cycle_lock.lock().await;
        self.process_queue().await;
    }

    /// One pass over the queue. Callers must hold `cycle_lock`.
    async fn process_queue(&self) {
        let events = self.queue.get_events_for_retry().await;

        if !events.is_empty() {
            let mut succeeded = 0usize;
            let mut failed = 0usize;

            for chunk in events.chunks(self.batch_size) {
                let outcomes =
                    join_all(chunk.iter().map(|queued| self.sender.send_event(&queued.event)))
                        .await;

                for (queued, outcome) in chunk.iter().zip(outcomes) {
                    match outcome {
                        Ok(()) => {
                            succeeded += 1;
                            self.queue
                                .update_event_after_retry(&queued.id, true, None)
                                .await;
                        }
                        Err(e) => {
                            failed += 1;
                            debug!(
                                event_id = %queued.id,
                                retry_count = queued.retry_count,
                                error = %e,
                                "Telemetry retry failed"
                            );
                            self.queue
                                .update_event_after_retry(&queued.id, false, Some(e.message))
                                .await;
                        }
                    }
                }
            }

            if failed > 0 && succeeded == 0 {
                warn!(attempted = events.len(), "All telemetry retries failed");
            } else {
                info!(
                    attempted = events.len(),
                    succeeded,
                    failed,
                    "Telemetry retry cycle complete"
                );
            }
            self.update_connection_status(succeeded > 0);
        }

        self.queue.prune_failed_events().await;

        let metadata = self.queue.get_queue_metadata().await;
        if self.remember_published(metadata) {
            (self.on_queue_size_change)(metadata.size, metadata.is_above_warning_threshold);
        }
    }

    async fn check_connection(&self) {
        let probe = TelemetryEvent::connection_check();
        match self.sender.send_event(&probe).await {
            Ok(()) => {
                debug!("Connection check succeeded");
                self.update_connection_status(true);
            }
            Err(e) => {
                debug!(error = %e, "Connection check failed");
                self.update_connection_status(false);
            }
        }
    }

    /// Store the status and notify if it changed.
    fn update_connection_status(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            info!(connected, "Telemetry connection status changed");
            (self.on_connection_status_change)(connected);
        }
    }

    /// Publish unconditionally.
    fn publish_queue_size(&self, metadata: QueueMetadata) {
        self.remember_published(metadata);
        if metadata.is_above_warning_threshold {
            warn!(size = metadata.size, "Telemetry retry queue above warning threshold");
        }
        (self.on_queue_size_change)(metadata.size, metadata.is_above_warning_threshold);
    }

    /// Returns `true` if `metadata` differs from the last published value.
    fn remember_published(&self, metadata: QueueMetadata) -> bool {
        let mut last = self
            .last_published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *last == Some(metadata) {
            return false;
        }
        *last = Some(metadata);
        true
    }
}
