//! Shared fixtures for Analytics integration tests.
//!
//! Provides:
//! - Recorder: destination plugin journaling every event it receives
//! - FailingTransport: ingest transport answering 503 to every request
//! - offline_settings: settings with the Events API switched off

#![allow(dead_code)]

use async_trait::async_trait;
use delivery_queue::{Transport, TransportError, TransportResult};
use events_core::{Context, Event};
use events_sdk::plugins::EVENTS_API;
use events_sdk::{
    Analytics, CdnSettings, Plugin, PluginError, PluginResult, PluginType, Settings,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Destination plugin that journals `<name>:<event name>`.
pub struct Recorder {
    name: String,
    journal: Journal,
    fail_load: bool,
    unloaded: AtomicBool,
}

impl Recorder {
    pub fn new(name: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal: journal.clone(),
            fail_load: false,
            unloaded: AtomicBool::new(false),
        })
    }

    /// A recorder whose `load` always fails.
    pub fn broken(name: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal: journal.clone(),
            fail_load: true,
            unloaded: AtomicBool::new(false),
        })
    }

    pub fn was_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }

    fn record(&self, ctx: &Context) {
        let label = ctx
            .event()
            .event
            .clone()
            .or_else(|| ctx.event().name.clone())
            .unwrap_or_else(|| ctx.event().event_type.as_str().to_string());
        self.journal.lock().push(format!("{}:{}", self.name, label));
    }
}

#[async_trait]
impl Plugin for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Destination
    }

    async fn load(&self, _ctx: &mut Context, _analytics: &Analytics) -> PluginResult<()> {
        if self.fail_load {
            return Err(PluginError::failed(&self.name, "no credentials"));
        }
        Ok(())
    }

    async fn unload(&self, _ctx: &mut Context, _analytics: &Analytics) -> PluginResult<()> {
        self.unloaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn track(&self, ctx: &mut Context) -> PluginResult<()> {
        self.record(ctx);
        Ok(())
    }

    async fn identify(&self, ctx: &mut Context) -> PluginResult<()> {
        self.record(ctx);
        Ok(())
    }

    async fn page(&self, ctx: &mut Context) -> PluginResult<()> {
        self.record(ctx);
        Ok(())
    }
}

/// Ingest transport that is always unavailable.
#[derive(Default)]
pub struct FailingTransport {
    requests: AtomicUsize,
}

impl FailingTransport {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _event: &Event) -> TransportResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    async fn send_batch(&self, _events: &[Event]) -> TransportResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Settings with no network: CDN settings given up front and the
/// ingest destination disabled.
pub fn offline_settings() -> Settings {
    let mut settings = Settings::new("test-write-key").with_cdn_settings(CdnSettings::default());
    settings
        .integrations
        .insert(EVENTS_API.to_string(), Value::Bool(false));
    settings
}

/// Offline settings with CDN routing rules.
pub fn settings_with_rules(rules: Value) -> Settings {
    let cdn_settings: CdnSettings = serde_json::from_value(json!({
        "integrations": {},
        "middlewareSettings": {"routingRules": rules}
    }))
    .unwrap();
    let mut settings = offline_settings();
    settings.cdn_settings = Some(cdn_settings);
    settings
}
