//! Context: the unit of work wrapping one event through the pipeline.

use crate::{CoreStats, Event, Metric, Stats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Severity of a context log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in the context's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLog {
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Value>,
    pub time: DateTime<Utc>,
}

/// Cooperative cancellation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextCancelation {
    /// Whether a queue may retry the event later.
    pub retry: bool,
    pub reason: Option<String>,
}

/// Arguments to [`Context::cancel`].
#[derive(Debug, Clone, Default)]
pub struct CancelationOptions {
    /// Defaults to `true`.
    pub retry: Option<bool>,
    pub reason: Option<String>,
}

impl CancelationOptions {
    /// Cancel without retry.
    pub fn drop(reason: impl Into<String>) -> Self {
        Self {
            retry: Some(false),
            reason: Some(reason.into()),
        }
    }
}

/// Recorded delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelivery {
    pub reason: String,
}

/// Persisted form of a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedContext {
    pub id: String,
    pub event: Event,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub logs: Vec<ContextLog>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// Wraps exactly one event for its whole pipeline lifetime.
///
/// The id never changes. The event may be replaced when a stage transforms it.
pub struct Context {
    id: String,
    event: Event,
    attempts: u32,
    cancellation: Option<ContextCancelation>,
    failed_delivery: Option<FailedDelivery>,
    logs: Vec<ContextLog>,
    stats: Arc<dyn Stats>,
}

impl Context {
    /// Create a context with a fresh id and its own [`CoreStats`].
    pub fn new(event: Event) -> Self {
        Self::with_stats(event, Arc::new(CoreStats::new()))
    }

    /// Create a context with an injected stats collaborator.
    pub fn with_stats(event: Event, stats: Arc<dyn Stats>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event,
            attempts: 0,
            cancellation: None,
            failed_delivery: None,
            logs: Vec::new(),
            stats,
        }
    }

    /// Destination-scoped copy: same id and stats, the given event, no
    /// attempts or cancellation.
    pub fn for_destination(&self, event: Event) -> Self {
        Self {
            id: self.id.clone(),
            event,
            attempts: 0,
            cancellation: None,
            failed_delivery: None,
            logs: Vec::new(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Fold a destination-scoped copy back in: its logs are appended and its
    /// cancellation, if any, becomes this context's cancellation.
    pub fn absorb(&mut self, scoped: Context) {
        self.logs.extend(scoped.logs);
        if let Some(cancelation) = scoped.cancellation {
            if self.cancellation.is_none() {
                self.cancellation = Some(cancelation);
            }
        }
        if self.failed_delivery.is_none() {
            self.failed_delivery = scoped.failed_delivery;
        }
    }

    /// Get the context ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn event_mut(&mut self) -> &mut Event {
        &mut self.event
    }

    /// Replace the wrapped event.
    pub fn update_event(&mut self, event: Event) {
        self.event = event;
    }

    pub fn into_event(self) -> Event {
        self.event
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn increment_attempts(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Mark the context cancelled. Dispatch stops at the next plugin boundary.
    pub fn cancel(&mut self, options: CancelationOptions) {
        let cancelation = ContextCancelation {
            retry: options.retry.unwrap_or(true),
            reason: options.reason,
        };
        debug!(
            context_id = %self.id,
            retry = cancelation.retry,
            reason = ?cancelation.reason,
            "Context cancelled"
        );
        self.log(
            LogLevel::Warn,
            "Context cancelled",
            serde_json::to_value(&cancelation).ok(),
        );
        self.cancellation = Some(cancelation);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }

    pub fn cancellation(&self) -> Option<&ContextCancelation> {
        self.cancellation.as_ref()
    }

    pub fn set_failed_delivery(&mut self, reason: impl Into<String>) {
        self.failed_delivery = Some(FailedDelivery {
            reason: reason.into(),
        });
    }

    pub fn failed_delivery(&self) -> Option<&FailedDelivery> {
        self.failed_delivery.as_ref()
    }

    /// Append an entry to the context log.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, extras: Option<Value>) {
        self.logs.push(ContextLog {
            level,
            message: message.into(),
            extras,
            time: Utc::now(),
        });
    }

    pub fn logs(&self) -> &[ContextLog] {
        &self.logs
    }

    pub fn stats(&self) -> &Arc<dyn Stats> {
        &self.stats
    }

    /// Snapshot for persistence.
    pub fn to_serialized(&self) -> SerializedContext {
        SerializedContext {
            id: self.id.clone(),
            event: self.event.clone(),
            attempts: self.attempts,
            logs: self.logs.clone(),
            metrics: self.stats.metrics(),
        }
    }

    /// Rebuild a context from its persisted form.
    pub fn from_serialized(serialized: SerializedContext) -> Self {
        Self {
            id: serialized.id,
            event: serialized.event,
            attempts: serialized.attempts,
            cancellation: None,
            failed_delivery: None,
            logs: serialized.logs,
            stats: Arc::new(CoreStats::with_metrics(serialized.metrics)),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("message_id", &self.event.message_id)
            .field("attempts", &self.attempts)
            .field("cancellation", &self.cancellation)
            .field("failed_delivery", &self.failed_delivery)
            .finish()
    }
}
