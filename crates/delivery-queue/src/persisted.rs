//! Priority queue mirrored to a key/value store.
//!
//! Every mutation writes the full queue contents through to the store; a new
//! queue re-hydrates from whatever the previous process left behind. Storage
//! problems switch the queue to memory-only and are never reported as
//! delivery failures.

use crate::queue::{ContextQueue, PriorityQueue, QueueEntry};
use crate::store::KeyValueStore;
use crate::QueueResult;
use chrono::{DateTime, Utc};
use events_core::{Context, SerializedContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store key holding the queued items of one destination.
pub fn persisted_queue_key(write_key: &str, destination: &str) -> String {
    format!("persisted-queue:v1:{}:{}:items", write_key, destination)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedItem {
    #[serde(flatten)]
    context: SerializedContext,
    #[serde(default)]
    enqueued_at: Option<DateTime<Utc>>,
}

/// [`PriorityQueue`] with write-through persistence.
pub struct PersistedPriorityQueue {
    inner: PriorityQueue,
    store: Option<Arc<dyn KeyValueStore>>,
    key: String,
}

impl PersistedPriorityQueue {
    /// Create the queue and re-hydrate it from `store`.
    pub fn new(max_attempts: u32, key: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        let mut queue = Self {
            inner: PriorityQueue::new(max_attempts),
            store: Some(store),
            key: key.into(),
        };
        queue.rehydrate();
        queue
    }

    /// Store key this queue writes to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether persistence was abandoned after a storage failure.
    pub fn is_degraded(&self) -> bool {
        self.store.is_none()
    }

    fn degrade(&mut self, reason: &str, error: &dyn std::fmt::Display) {
        warn!(key = %self.key, error = %error, "{}; queue continues in memory only", reason);
        self.store = None;
    }

    fn rehydrate(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let raw = match store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                self.degrade("Failed to read persisted queue", &e);
                return;
            }
        };

        let items: Vec<PersistedItem> = match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(e) => {
                self.degrade("Persisted queue is corrupt", &e);
                return;
            }
        };

        let total = items.len();
        let mut restored = 0;
        for item in items {
            let enqueued_at = item.enqueued_at.unwrap_or_else(Utc::now);
            let entry = QueueEntry::restored(Context::from_serialized(item.context), enqueued_at);
            match self.inner.push_entry(entry, false) {
                Ok(()) => restored += 1,
                Err(e) => debug!(key = %self.key, error = %e, "Skipping persisted entry"),
            }
        }

        info!(key = %self.key, restored, total, "Re-hydrated persisted queue");
    }

    fn persist(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let result = if self.inner.is_empty() {
            store.remove(&self.key).map(|_| ())
        } else {
            let items: Vec<PersistedItem> = self
                .inner
                .entries()
                .into_iter()
                .map(|entry| PersistedItem {
                    context: entry.context.to_serialized(),
                    enqueued_at: Some(entry.enqueued_at),
                })
                .collect();
            match serde_json::to_string(&items) {
                Ok(raw) => store.set(&self.key, &raw),
                Err(e) => {
                    self.degrade("Failed to serialize queue", &e);
                    return;
                }
            }
        };

        if let Err(e) = result {
            self.degrade("Failed to write persisted queue", &e);
        }
    }
}

impl ContextQueue for PersistedPriorityQueue {
    fn push_entry(&mut self, entry: QueueEntry, with_backoff: bool) -> QueueResult<()> {
        self.inner.push_entry(entry, with_backoff)?;
        self.persist();
        Ok(())
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        let entry = self.inner.pop()?;
        self.persist();
        Some(entry)
    }

    fn pop_many(&mut self, max: usize) -> Vec<QueueEntry> {
        let entries = self.inner.pop_many(max);
        if !entries.is_empty() {
            self.persist();
        }
        entries
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn ready_len(&self) -> usize {
        self.inner.ready_len()
    }

    fn includes(&self, id: &str) -> bool {
        self.inner.includes(id)
    }

    fn max_attempts(&self) -> u32 {
        self.inner.max_attempts()
    }
}
