//! Metrics collaborator injected into every Context.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Kind of a recorded metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// One recorded metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unix millis.
    pub timestamp: i64,
}

/// Stage-keyed metrics sink.
pub trait Stats: Send + Sync {
    /// Add `by` to a counter.
    fn increment(&self, metric: &str, by: f64, tags: &[String]);

    /// Record a gauge value.
    fn gauge(&self, metric: &str, value: f64, tags: &[String]);

    /// Snapshot of everything recorded since the last flush.
    fn metrics(&self) -> Vec<Metric>;

    /// Drain and return the recorded metrics.
    fn flush(&self) -> Vec<Metric>;
}

/// In-memory [`Stats`] implementation.
#[derive(Debug, Default)]
pub struct CoreStats {
    metrics: Mutex<Vec<Metric>>,
}

impl CoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the collector with previously serialized metrics.
    pub fn with_metrics(metrics: Vec<Metric>) -> Self {
        Self {
            metrics: Mutex::new(metrics),
        }
    }

    fn record(&self, metric: &str, value: f64, kind: MetricKind, tags: &[String]) {
        self.metrics.lock().push(Metric {
            metric: metric.to_string(),
            value,
            kind,
            tags: tags.to_vec(),
            timestamp: Utc::now().timestamp_millis(),
        });
    }
}

impl Stats for CoreStats {
    fn increment(&self, metric: &str, by: f64, tags: &[String]) {
        self.record(metric, by, MetricKind::Counter, tags);
    }

    fn gauge(&self, metric: &str, value: f64, tags: &[String]) {
        self.record(metric, value, MetricKind::Gauge, tags);
    }

    fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().clone()
    }

    fn flush(&self) -> Vec<Metric> {
        std::mem::take(&mut *self.metrics.lock())
    }
}
