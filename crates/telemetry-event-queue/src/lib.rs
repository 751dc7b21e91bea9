//! Durable event queue for telemetry redelivery.
//!
//! This crate provides:
//! - EventQueue: policy-aware queue (backoff eligibility, pruning, metadata)
//! - EventStore: storage seam, implemented by MemoryStore and SqliteStore
//! - RetryQueue: the queue operations a retry scheduler depends on

mod error;
mod event;
mod memory;
mod migrations;
mod queue;
mod sqlite;
mod store;

pub use error::{QueueError, QueueResult};
pub use event::{EventName, QueueMetadata, QueuedEvent, TelemetryEvent, CONNECTION_CHECK};
pub use memory::MemoryStore;
pub use queue::{compute_backoff, EventQueue, QueuePolicy, RetryQueue};
pub use sqlite::SqliteStore;
pub use store::EventStore;
