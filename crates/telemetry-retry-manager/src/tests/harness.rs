//! Test harness for retry manager tests.
//!
//! Provides:
//! - MockQueue: an in-memory RetryQueue with no backoff that records calls
//! - MockSender: an EventSender with a failure toggle, a send log,
//!   concurrency tracking and an optional gate
//! - Recorder: captures callback invocations

use crate::{
    EventSender, QueueMetadata, QueuedEvent, RetryManagerConfig, RetryQueue, SendError,
    TelemetryEvent,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// A recorded `update_event_after_retry` call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCall {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// In-memory queue where every stored event is always eligible.
pub struct MockQueue {
    events: Mutex<Vec<QueuedEvent>>,
    updates: Mutex<Vec<UpdateCall>>,
    warning_threshold: usize,
    get_events_calls: AtomicUsize,
    prune_calls: AtomicUsize,
    prune_gate: Option<Arc<Semaphore>>,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::with_warning_threshold(1000)
    }

    pub fn with_warning_threshold(warning_threshold: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            warning_threshold,
            get_events_calls: AtomicUsize::new(0),
            prune_calls: AtomicUsize::new(0),
            prune_gate: None,
        }
    }

    /// Every prune waits for a permit from `gate`.
    pub fn with_prune_gate(gate: Arc<Semaphore>) -> Self {
        Self {
            prune_gate: Some(gate),
            ..Self::new()
        }
    }

    /// Seed `count` events without touching any manager state.
    pub fn preload(&self, count: usize) -> Vec<String> {
        let mut events = self.events.lock().unwrap();
        (0..count)
            .map(|i| {
                let queued = QueuedEvent::new(TelemetryEvent::named(format!("event_{i}")), None);
                let id = queued.id.clone();
                events.push(queued);
                id
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn retry_count(&self, id: &str) -> Option<u32> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.retry_count)
    }

    pub fn updates(&self) -> Vec<UpdateCall> {
        self.updates.lock().unwrap().clone()
    }

    pub fn get_events_calls(&self) -> usize {
        self.get_events_calls.load(Ordering::SeqCst)
    }

    pub fn prune_calls(&self) -> usize {
        self.prune_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetryQueue for MockQueue {
    async fn enqueue(&self, event: TelemetryEvent, reason: Option<String>) -> String {
        let queued = QueuedEvent::new(event, reason);
        let id = queued.id.clone();
        self.events.lock().unwrap().push(queued);
        id
    }

    async fn get_events_for_retry(&self) -> Vec<QueuedEvent> {
        self.get_events_calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().clone()
    }

    async fn update_event_after_retry(&self, id: &str, success: bool, error: Option<String>) {
        self.updates.lock().unwrap().push(UpdateCall {
            id: id.to_string(),
            success,
            error: error.clone(),
        });

        let mut events = self.events.lock().unwrap();
        if success {
            events.retain(|e| e.id != id);
        } else if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.retry_count += 1;
            if error.is_some() {
                event.reason = error;
            }
        }
    }

    async fn prune_failed_events(&self) -> usize {
        self.prune_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.prune_gate {
            gate.acquire().await.unwrap().forget();
        }
        0
    }

    async fn get_queue_metadata(&self) -> QueueMetadata {
        let size = self.len();
        QueueMetadata {
            size,
            is_above_warning_threshold: size > self.warning_threshold,
        }
    }
}

/// Sender whose outcome is controlled by the test.
pub struct MockSender {
    fail: AtomicBool,
    sent: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing() -> Self {
        let sender = Self::new();
        sender.set_failing(true);
        sender
    }

    /// Every send waits for a permit from `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Names of every event passed to `send_event`, in call order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSender for MockSender {
    async fn send_event(&self, event: &TelemetryEvent) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(event.name.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            Err(SendError::new("collector unavailable"))
        } else {
            Ok(())
        }
    }
}

/// Captures callback invocations.
#[derive(Clone, Default)]
pub struct Recorder {
    statuses: Arc<Mutex<Vec<bool>>>,
    sizes: Arc<Mutex<Vec<(usize, bool)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager config wired to this recorder.
    pub fn config(&self, retry_interval: Duration, batch_size: usize) -> RetryManagerConfig {
        let statuses = self.statuses.clone();
        let sizes = self.sizes.clone();
        RetryManagerConfig::new(retry_interval, batch_size)
            .on_connection_status_change(move |connected| {
                statuses.lock().unwrap().push(connected)
            })
            .on_queue_size_change(move |size, above| sizes.lock().unwrap().push((size, above)))
    }

    pub fn statuses(&self) -> Vec<bool> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn sizes(&self) -> Vec<(usize, bool)> {
        self.sizes.lock().unwrap().clone()
    }
}

/// Let spawned tasks run until they block on a timer.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
