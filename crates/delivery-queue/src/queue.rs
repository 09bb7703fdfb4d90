//! Priority queue of contexts awaiting delivery.

use crate::{QueueError, QueueResult};
use chrono::{DateTime, Utc};
use events_core::Context;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default number of failed attempts tolerated before an entry is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Backoff for the first retry, before jitter.
pub const BACKOFF_MIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on a single backoff delay.
pub const BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Jittered exponential backoff: `500ms * 2^attempts * [1, 2)`, capped.
pub fn backoff(attempts: u32) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(1.0..2.0);
    backoff_with_jitter(attempts, jitter)
}

/// [`backoff`] with an explicit jitter factor.
pub fn backoff_with_jitter(attempts: u32, jitter: f64) -> Duration {
    let factor = 2f64.powi(attempts.min(32) as i32);
    let millis = jitter * BACKOFF_MIN_TIMEOUT.as_millis() as f64 * factor;
    Duration::from_millis(millis as u64).min(BACKOFF_MAX)
}

/// A queued context.
#[derive(Debug)]
pub struct QueueEntry {
    pub context: Context,
    /// When the context first entered the queue. Kept across requeues.
    pub enqueued_at: DateTime<Utc>,
    seq: Option<u64>,
}

impl QueueEntry {
    pub fn new(context: Context) -> Self {
        Self::restored(context, Utc::now())
    }

    /// Entry with a known original enqueue time.
    pub fn restored(context: Context, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            context,
            enqueued_at,
            seq: None,
        }
    }

    pub fn id(&self) -> &str {
        self.context.id()
    }

    pub fn attempts(&self) -> u32 {
        self.context.attempts()
    }

    fn priority_key(&self) -> (u32, u64) {
        (self.attempts(), self.seq.unwrap_or(u64::MAX))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority_key() == other.priority_key()
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Fewer attempts first, then enqueue order.
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority_key().cmp(&self.priority_key())
    }
}

/// Storage-agnostic queue contract shared by the in-memory and persisted queues.
pub trait ContextQueue: Send {
    /// Insert an entry. With `with_backoff`, entries that have been attempted
    /// before are held until their backoff elapses.
    fn push_entry(&mut self, entry: QueueEntry, with_backoff: bool) -> QueueResult<()>;

    /// Take the highest-priority ready entry.
    fn pop(&mut self) -> Option<QueueEntry>;

    /// Entries queued or held, ready or not.
    fn len(&self) -> usize;

    /// Entries that [`pop`](Self::pop) could return right now.
    fn ready_len(&self) -> usize;

    fn includes(&self, id: &str) -> bool;

    fn max_attempts(&self) -> u32;

    fn push(&mut self, context: Context) -> QueueResult<()> {
        self.push_entry(QueueEntry::new(context), false)
    }

    fn push_with_backoff(&mut self, context: Context) -> QueueResult<()> {
        self.push_entry(QueueEntry::new(context), true)
    }

    /// Take up to `max` ready entries in priority order.
    fn pop_many(&mut self, max: usize) -> Vec<QueueEntry> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.pop() {
                Some(entry) => out.push(entry),
                None => break,
            }
        }
        out
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct HeldEntry {
    ready_at: Instant,
    entry: QueueEntry,
}

/// In-memory priority queue.
///
/// Ordered by attempts ascending, FIFO among equal attempts. Rejects
/// duplicate context ids and entries past `max_attempts`.
#[derive(Debug)]
pub struct PriorityQueue {
    max_attempts: u32,
    ready: BinaryHeap<QueueEntry>,
    held: Vec<HeldEntry>,
    ids: HashSet<String>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ready: BinaryHeap::new(),
            held: Vec::new(),
            ids: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Move held entries whose backoff has elapsed into the ready heap.
    fn promote_due(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut i = 0;
        while i < self.held.len() {
            if self.held[i].ready_at <= now {
                let held = self.held.swap_remove(i);
                self.ready.push(held.entry);
            } else {
                i += 1;
            }
        }
    }

    /// Every entry, ready ones in priority order followed by held ones.
    pub fn entries(&self) -> Vec<&QueueEntry> {
        let mut ready: Vec<&QueueEntry> = self.ready.iter().collect();
        ready.sort_by(|a, b| b.cmp(a));
        ready.extend(self.held.iter().map(|held| &held.entry));
        ready
    }

    /// Time until the next held entry becomes ready.
    pub fn next_ready_in(&self) -> Option<Duration> {
        let now = Instant::now();
        self.held
            .iter()
            .map(|held| held.ready_at.saturating_duration_since(now))
            .min()
    }
}

impl ContextQueue for PriorityQueue {
    fn push_entry(&mut self, mut entry: QueueEntry, with_backoff: bool) -> QueueResult<()> {
        let attempts = entry.attempts();
        if attempts > self.max_attempts {
            return Err(QueueError::AttemptsExceeded {
                id: entry.id().to_string(),
                attempts,
                max_attempts: self.max_attempts,
            });
        }
        if self.ids.contains(entry.id()) {
            return Err(QueueError::Duplicate(entry.id().to_string()));
        }

        if entry.seq.is_none() {
            entry.seq = Some(self.next_seq);
            self.next_seq += 1;
        }
        self.ids.insert(entry.id().to_string());

        if with_backoff && attempts > 0 {
            let delay = backoff(attempts);
            debug!(
                context_id = %entry.id(),
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Holding entry for backoff"
            );
            self.held.push(HeldEntry {
                ready_at: Instant::now() + delay,
                entry,
            });
        } else {
            self.ready.push(entry);
        }
        Ok(())
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.promote_due();
        let entry = self.ready.pop()?;
        self.ids.remove(entry.id());
        Some(entry)
    }

    fn len(&self) -> usize {
        self.ready.len() + self.held.len()
    }

    fn ready_len(&self) -> usize {
        let now = Instant::now();
        self.ready.len() + self.held.iter().filter(|held| held.ready_at <= now).count()
    }

    fn includes(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
