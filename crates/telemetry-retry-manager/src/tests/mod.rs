//! Retry manager tests.
//!
//! - `harness.rs`    - Mock queue, mock sender and callback recorder
//! - `scheduling.rs` - Timer cadence, start/stop and heartbeat probes
//! - `processing.rs` - Processing cycle outcomes, batching and callbacks

pub(crate) mod harness;
mod scheduling;
