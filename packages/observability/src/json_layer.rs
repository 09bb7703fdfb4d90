//! JSONL layer.
//!
//! One object per event. The SDK's correlation fields (`message_id`,
//! `destination`, `plugin`) are lifted to the top level so log files can be
//! filtered per event or per destination without digging into `fields`.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Fields promoted out of `fields` into the entry itself.
const CORRELATION_FIELDS: [&str; 3] = ["message_id", "destination", "plugin"];

/// One line of the JSONL log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// RFC 3339, microsecond precision
    pub timestamp: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    /// Module path of the call site
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Innermost span, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl LogEntry {
    /// Move correlation fields out of `fields`.
    fn promote_correlation_fields(&mut self) {
        for name in CORRELATION_FIELDS {
            let Some(value) = self.fields.remove(name) else {
                continue;
            };
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            match name {
                "message_id" => self.message_id = Some(value),
                "destination" => self.destination = Some(value),
                _ => self.plugin = Some(value),
            }
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Layer writing [`LogEntry`] lines to `make_writer`.
pub struct JsonLayer<W> {
    service_name: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: impl Into<String>, make_writer: W) -> Self {
        Self {
            service_name: service_name.into(),
            pid: std::process::id(),
            make_writer,
        }
    }

    fn entry(&self, event: &Event<'_>, span: Option<String>) -> LogEntry {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();

        let mut entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: metadata.level().as_str(),
            service: self.service_name.clone(),
            pid: self.pid,
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            message_id: None,
            destination: None,
            plugin: None,
            fields: visitor.fields,
            span,
        };
        entry.promote_correlation_fields();
        entry
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let span = ctx.event_span(event).map(|s| s.name().to_string());
        let entry = self.entry(event, span);

        if let Ok(line) = serde_json::to_string(&entry) {
            let _ = writeln!(self.make_writer.make_writer(), "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFileWriter;
    use tempfile::tempdir;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(emit: impl FnOnce()) -> Vec<Value> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.jsonl");
        let writer = LogFileWriter::new(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(JsonLayer::new("test", writer));

        tracing::subscriber::with_default(subscriber, emit);

        std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_correlation_fields_are_promoted() {
        let lines = capture(|| {
            tracing::warn!(
                destination = "Events API",
                message_id = %"1700000000000-abc",
                attempts = 3u64,
                "Delivery failed, retrying"
            );
        });

        let line = &lines[0];
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["service"], "test");
        assert_eq!(line["message"], "Delivery failed, retrying");
        assert_eq!(line["destination"], "Events API");
        assert_eq!(line["message_id"], "1700000000000-abc");
        assert_eq!(line["fields"]["attempts"], 3);
        assert!(line["fields"].get("destination").is_none());
    }

    #[test]
    fn test_entry_without_fields_omits_them() {
        let lines = capture(|| tracing::info!("Analytics ready"));

        let line = &lines[0];
        assert_eq!(line["level"], "INFO");
        assert!(line.get("fields").is_none());
        assert!(line.get("plugin").is_none());
        assert!(line["pid"].is_u64());
    }
}
