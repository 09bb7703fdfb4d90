//! Reliable delivery for the events SDK.
//!
//! This crate provides:
//! - PriorityQueue: in-memory retry queue ordered by attempts, then FIFO
//! - PersistedPriorityQueue: the same queue mirrored to a key/value store
//! - KeyValueStore: MemoryStore and SQLite-backed SqliteStore
//! - Transport: HTTP delivery to the ingest API
//! - DeliveryWorker: single consumer with backoff, offline handling and batching

mod error;
mod persisted;
mod probe;
mod queue;
mod store;
mod transport;
mod worker;

#[cfg(test)]
mod tests;

pub use error::{
    QueueError, QueueResult, StoreError, StoreResult, TransportError, TransportResult,
};
pub use persisted::{persisted_queue_key, PersistedPriorityQueue};
pub use probe::{AlwaysOnline, ConnectivityProbe, ManualProbe};
pub use queue::{
    backoff, backoff_with_jitter, ContextQueue, PriorityQueue, QueueEntry, BACKOFF_MAX,
    BACKOFF_MIN_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, SCHEMA_VERSION};
pub use transport::{HttpTransport, HttpTransportConfig, Transport, DEFAULT_API_HOST};
pub use worker::{
    DeliveryHandle, DeliveryOutcome, DeliveryReport, DeliveryStrategy, DeliveryWorker,
    SharedQueue, WorkerConfig, WorkerTransition,
};
