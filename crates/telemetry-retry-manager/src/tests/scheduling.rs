//! Timer-driven behavior, run on a paused clock.

use super::harness::{settle, MockQueue, MockSender, Recorder};
use crate::{RetryManager, CONNECTION_CHECK};
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(30);

fn manager(queue: &Arc<MockQueue>, sender: &Arc<MockSender>, recorder: &Recorder) -> RetryManager {
    RetryManager::new(queue.clone(), sender.clone(), recorder.config(INTERVAL, 10)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn first_cycle_runs_on_start_then_every_interval() {
    let queue = Arc::new(MockQueue::new());
    let sender = Arc::new(MockSender::new());
    let manager = manager(&queue, &sender, &Recorder::new());

    assert_eq!(queue.get_events_calls(), 0);
    manager.start();
    assert!(manager.is_running());
    settle().await;
    assert_eq!(queue.get_events_calls(), 1);

    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert_eq!(queue.get_events_calls(), 2);

    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert_eq!(queue.get_events_calls(), 3);

    manager.stop();
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let queue = Arc::new(MockQueue::new());
    let sender = Arc::new(MockSender::new());
    let manager = manager(&queue, &sender, &Recorder::new());

    manager.start();
    manager.start();
    settle().await;
    manager.start();

    tokio::time::advance(INTERVAL).await;
    settle().await;
    tokio::time::advance(INTERVAL).await;
    settle().await;

    assert_eq!(queue.get_events_calls(), 3);
    manager.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_halts_scheduling() {
    let queue = Arc::new(MockQueue::new());
    let sender = Arc::new(MockSender::new());
    let manager = manager(&queue, &sender, &Recorder::new());

    manager.start();
    settle().await;
    manager.stop();
    assert!(!manager.is_running());
    settle().await;

    tokio::time::advance(INTERVAL * 4).await;
    settle().await;
    assert_eq!(queue.get_events_calls(), 1);
    assert!(sender.sent().is_empty());

    // Stopping twice is harmless.
    manager.stop();
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop_schedules_again() {
    let queue = Arc::new(MockQueue::new());
    let sender = Arc::new(MockSender::new());
    let manager = manager(&queue, &sender, &Recorder::new());

    manager.start();
    settle().await;
    manager.stop();
    settle().await;

    manager.start();
    settle().await;
    assert_eq!(queue.get_events_calls(), 2);
    manager.stop();
}

#[tokio::test(start_paused = true)]
async fn heartbeat_probe_tracks_connection() {
    let queue = Arc::new(MockQueue::new());
    let sender = Arc::new(MockSender::failing());
    let recorder = Recorder::new();
    let manager = manager(&queue, &sender, &recorder);

    manager.start();
    settle().await;
    // Empty queue: no sends, no status change.
    assert!(sender.sent().is_empty());
    assert!(manager.connection_status());

    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert!(sender.sent().is_empty());

    // Heartbeat fires at twice the retry interval.
    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert_eq!(sender.sent(), vec![CONNECTION_CHECK.to_string()]);
    assert!(!manager.connection_status());
    assert_eq!(recorder.statuses(), vec![false]);

    sender.set_failing(false);
    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert!(!manager.connection_status());

    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert_eq!(sender.sent().len(), 2);
    assert!(manager.connection_status());
    assert_eq!(recorder.statuses(), vec![false, true]);

    manager.stop();
}

#[tokio::test(start_paused = true)]
async fn scheduled_cycle_delivers_queued_events() {
    let queue = Arc::new(MockQueue::new());
    let sender = Arc::new(MockSender::failing());
    let manager = manager(&queue, &sender, &Recorder::new());
    queue.preload(2);

    manager.start();
    settle().await;
    assert_eq!(sender.sent().len(), 2);
    assert_eq!(queue.len(), 2);

    sender.set_failing(false);
    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert_eq!(sender.sent().len(), 4);
    assert_eq!(queue.len(), 0);
    assert!(manager.connection_status());

    manager.stop();
}

#[tokio::test(start_paused = true)]
async fn dropping_manager_stops_worker() {
    let queue = Arc::new(MockQueue::new());
    let sender = Arc::new(MockSender::new());
    let manager = manager(&queue, &sender, &Recorder::new());

    manager.start();
    settle().await;
    drop(manager);
    settle().await;

    tokio::time::advance(INTERVAL * 4).await;
    settle().await;
    assert_eq!(queue.get_events_calls(), 1);
    assert!(sender.sent().is_empty());
}
