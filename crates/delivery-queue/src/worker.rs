//! Delivery worker: the sole consumer of a destination's queue.
//!
//! The worker wakes on a fixed interval (and on every push), pops the next
//! ready entry or batch, checks connectivity, and hands the events to the
//! transport. Failures are retried with backoff until the queue's
//! `max_attempts` is exceeded, at which point the entry is dropped and a
//! single `Failed` report is published.

use crate::probe::ConnectivityProbe;
use crate::queue::{ContextQueue, QueueEntry};
use crate::transport::Transport;
use crate::{QueueResult, TransportError};
use chrono::Utc;
use events_core::{Context, Event};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Queue shared between producers and the worker.
pub type SharedQueue = Arc<Mutex<Box<dyn ContextQueue>>>;

/// Capacity of the delivery report channel.
const REPORT_CHANNEL_CAPACITY: usize = 256;

/// How events leave the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStrategy {
    /// One event per request.
    Standard,
    /// Up to `size` events per request, sent when `size` are ready or every
    /// `timeout`.
    Batching { size: usize, timeout: Duration },
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Destination name stamped on reports and logs.
    pub destination: String,
    /// Tick period in standard mode.
    pub flush_interval: Duration,
    pub strategy: DeliveryStrategy,
    /// Entries older than this are dropped instead of sent.
    pub max_residency: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            destination: "destination".to_string(),
            flush_interval: Duration::from_millis(500),
            strategy: DeliveryStrategy::Standard,
            max_residency: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

/// Final result of delivering one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

/// Published once per context when it leaves the queue for good.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub destination: String,
    pub context_id: String,
    pub event: Event,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

/// Result of a start/stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerTransition {
    Started,
    AlreadyRunning,
    Stopped,
    AlreadyStopped,
}

/// Push-only access to a worker's queue.
#[derive(Clone)]
pub struct DeliveryHandle {
    queue: SharedQueue,
    notify: Arc<Notify>,
}

impl DeliveryHandle {
    /// Enqueue a context for delivery and wake the worker.
    pub fn push(&self, context: Context) -> QueueResult<()> {
        self.queue.lock().push(context)?;
        self.notify.notify_one();
        Ok(())
    }

    /// Number of queued contexts, including those waiting out a backoff.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct WorkerShared {
    config: WorkerConfig,
    queue: SharedQueue,
    transport: Arc<dyn Transport>,
    probe: Arc<dyn ConnectivityProbe>,
    reports: broadcast::Sender<DeliveryReport>,
    notify: Arc<Notify>,
}

struct RunningWorker {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Background consumer for one destination queue.
pub struct DeliveryWorker {
    shared: Arc<WorkerShared>,
    running: Mutex<Option<RunningWorker>>,
}

impl DeliveryWorker {
    /// Create a new worker. Call [`start`](Self::start) to begin consuming.
    pub fn new(
        config: WorkerConfig,
        queue: Box<dyn ContextQueue>,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(WorkerShared {
                config,
                queue: Arc::new(Mutex::new(queue)),
                transport,
                probe,
                reports,
                notify: Arc::new(Notify::new()),
            }),
            running: Mutex::new(None),
        }
    }

    /// Get a push-only handle for producers.
    pub fn handle(&self) -> DeliveryHandle {
        DeliveryHandle {
            queue: Arc::clone(&self.shared.queue),
            notify: Arc::clone(&self.shared.notify),
        }
    }

    /// Subscribe to delivery reports.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.shared.reports.subscribe()
    }

    pub fn destination(&self) -> &str {
        &self.shared.config.destination
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Number of queued contexts, including those waiting out a backoff.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Spawn the worker loop. Must be called within a tokio runtime.
    pub fn start(&self) -> WorkerTransition {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!(destination = %self.shared.config.destination, "Delivery worker already running");
            return WorkerTransition::AlreadyRunning;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            run_loop(shared, shutdown_rx).await;
        });
        *running = Some(RunningWorker { shutdown_tx, task });

        info!(destination = %self.shared.config.destination, "Started delivery worker");
        WorkerTransition::Started
    }

    /// Stop the worker loop, waiting for any in-flight delivery to finish.
    pub async fn stop(&self) -> WorkerTransition {
        let Some(running) = self.running.lock().take() else {
            debug!(destination = %self.shared.config.destination, "Delivery worker already stopped");
            return WorkerTransition::AlreadyStopped;
        };

        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.task.await {
            warn!(destination = %self.shared.config.destination, error = %e, "Delivery worker task failed");
        }

        info!(destination = %self.shared.config.destination, "Stopped delivery worker");
        WorkerTransition::Stopped
    }

    /// Run a single delivery round immediately. Returns the number of
    /// contexts that left the queue for good.
    pub async fn flush_once(&self) -> usize {
        self.shared.process_round().await
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.shutdown_tx.send(());
        }
    }
}

async fn run_loop(shared: Arc<WorkerShared>, mut shutdown_rx: oneshot::Receiver<()>) {
    let period = match &shared.config.strategy {
        DeliveryStrategy::Standard => shared.config.flush_interval,
        DeliveryStrategy::Batching { timeout, .. } => *timeout,
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!(destination = %shared.config.destination, "Delivery worker shutting down");
                break;
            }
            _ = ticker.tick() => {
                shared.process_round().await;
            }
            _ = shared.notify.notified() => {
                if shared.should_flush_on_push() {
                    shared.process_round().await;
                }
            }
        }
    }
}

impl WorkerShared {
    fn round_size(&self) -> usize {
        match &self.config.strategy {
            DeliveryStrategy::Standard => 1,
            DeliveryStrategy::Batching { size, .. } => (*size).max(1),
        }
    }

    fn should_flush_on_push(&self) -> bool {
        match &self.config.strategy {
            DeliveryStrategy::Standard => true,
            DeliveryStrategy::Batching { size, .. } => self.queue.lock().ready_len() >= *size,
        }
    }

    fn report(&self, context: &Context, outcome: DeliveryOutcome) {
        let _ = self.reports.send(DeliveryReport {
            destination: self.config.destination.clone(),
            context_id: context.id().to_string(),
            event: context.event().clone(),
            attempts: context.attempts(),
            outcome,
        });
    }

    fn fail(&self, mut context: Context, reason: String) {
        warn!(
            destination = %self.config.destination,
            message_id = %context.event().message_id,
            attempts = context.attempts(),
            reason = %reason,
            "Dropping undeliverable event"
        );
        context.set_failed_delivery(reason.clone());
        context
            .stats()
            .increment("delivery_failed", 1.0, &[format!("destination:{}", self.config.destination)]);
        self.report(&context, DeliveryOutcome::Failed { reason });
    }

    /// Drop entries that outlived `max_residency`.
    fn expire(&self, entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
        let Some(max_residency) = self.config.max_residency else {
            return entries;
        };
        let now = Utc::now();

        let mut live = Vec::with_capacity(entries.len());
        for entry in entries {
            let age = (now - entry.enqueued_at).to_std().unwrap_or_default();
            if age > max_residency {
                self.fail(entry.context, "exceeded max residency".to_string());
            } else {
                live.push(entry);
            }
        }
        live
    }

    fn requeue(&self, entries: Vec<QueueEntry>, with_backoff: bool) {
        let mut queue = self.queue.lock();
        for entry in entries {
            let id = entry.id().to_string();
            if let Err(e) = queue.push_entry(entry, with_backoff) {
                debug!(destination = %self.config.destination, context_id = %id, error = %e, "Could not requeue entry");
            }
        }
    }

    async fn process_round(&self) -> usize {
        let entries = {
            let mut queue = self.queue.lock();
            queue.pop_many(self.round_size())
        };
        if entries.is_empty() {
            return 0;
        }

        let before = entries.len();
        let entries = self.expire(entries);
        let expired = before - entries.len();
        if entries.is_empty() {
            return expired;
        }

        if !self.probe.is_online() {
            debug!(destination = %self.config.destination, count = entries.len(), "Offline, requeueing without an attempt");
            self.requeue(entries, false);
            return expired;
        }

        let result = match (&self.config.strategy, entries.as_slice()) {
            (DeliveryStrategy::Standard, [entry]) => self.transport.send(entry.context.event()).await,
            _ => {
                let events: Vec<Event> = entries.iter().map(|e| e.context.event().clone()).collect();
                self.transport.send_batch(&events).await
            }
        };

        match result {
            Ok(()) => {
                for entry in &entries {
                    info!(
                        destination = %self.config.destination,
                        message_id = %entry.context.event().message_id,
                        attempts = entry.attempts(),
                        "Delivered event"
                    );
                    entry
                        .context
                        .stats()
                        .increment("delivered", 1.0, &[format!("destination:{}", self.config.destination)]);
                    self.report(&entry.context, DeliveryOutcome::Delivered);
                }
                expired + entries.len()
            }
            Err(e) => expired + self.handle_failure(entries, &e),
        }
    }

    /// Count an attempt against every entry; drop the exhausted ones and
    /// requeue the rest with backoff. Returns how many were dropped.
    fn handle_failure(&self, entries: Vec<QueueEntry>, error: &TransportError) -> usize {
        let max_attempts = self.queue.lock().max_attempts();
        let mut retry = Vec::new();
        let mut dropped = 0;

        for mut entry in entries {
            let attempts = entry.context.increment_attempts();
            if !error.is_retryable() || attempts > max_attempts {
                dropped += 1;
                self.fail(entry.context, error.to_string());
            } else {
                warn!(
                    destination = %self.config.destination,
                    message_id = %entry.context.event().message_id,
                    attempts,
                    error = %error,
                    "Delivery failed, retrying"
                );
                retry.push(entry);
            }
        }

        if !retry.is_empty() {
            self.requeue(retry, true);
        }
        dropped
    }
}
