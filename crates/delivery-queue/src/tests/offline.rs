//! Connectivity handling and worker lifecycle.

use super::harness::{track, TestHarness};
use crate::{DeliveryOutcome, PriorityQueue, WorkerConfig, WorkerTransition, DEFAULT_MAX_ATTEMPTS};
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_offline_requeues_without_counting_attempt() {
    let mut h = TestHarness::new(PriorityQueue::new(DEFAULT_MAX_ATTEMPTS));
    h.probe.set_online(false);
    h.push(track("a"));

    assert_eq!(h.worker.flush_once().await, 0);
    assert_eq!(h.worker.flush_once().await, 0);
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(h.worker.queue_len(), 1);

    h.probe.set_online(true);
    assert_eq!(h.worker.flush_once().await, 1);

    let reports = h.drain_reports();
    assert_eq!(reports[0].attempts, 0);
    assert_eq!(reports[0].outcome, DeliveryOutcome::Delivered);
}

#[tokio::test]
async fn test_start_stop_transitions() {
    let h = TestHarness::new(PriorityQueue::new(DEFAULT_MAX_ATTEMPTS));

    assert_eq!(h.worker.start(), WorkerTransition::Started);
    assert_eq!(h.worker.start(), WorkerTransition::AlreadyRunning);
    assert!(h.worker.is_running());

    assert_eq!(h.worker.stop().await, WorkerTransition::Stopped);
    assert_eq!(h.worker.stop().await, WorkerTransition::AlreadyStopped);
    assert!(!h.worker.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_running_worker_delivers_after_reconnect() {
    let mut h = TestHarness::with_config(
        PriorityQueue::new(DEFAULT_MAX_ATTEMPTS),
        WorkerConfig {
            destination: "test".to_string(),
            flush_interval: Duration::from_millis(100),
            ..WorkerConfig::default()
        },
    );
    h.probe.set_online(false);
    h.worker.start();
    h.push(track("a"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.transport.request_count(), 0);

    h.probe.set_online(true);
    let report = timeout(Duration::from_secs(5), h.reports.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, DeliveryOutcome::Delivered);
    assert_eq!(report.attempts, 0);

    h.worker.stop().await;
}

#[tokio::test]
async fn test_push_wakes_running_worker() {
    let mut h = TestHarness::with_config(
        PriorityQueue::new(DEFAULT_MAX_ATTEMPTS),
        WorkerConfig {
            destination: "test".to_string(),
            flush_interval: Duration::from_secs(3600),
            ..WorkerConfig::default()
        },
    );
    h.worker.start();
    // Let the immediate first tick pass.
    tokio::task::yield_now().await;

    let id = h.push(track("a"));
    let report = timeout(Duration::from_secs(5), h.reports.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.event.message_id, id);

    h.worker.stop().await;
}
