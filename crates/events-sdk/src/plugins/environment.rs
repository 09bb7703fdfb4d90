//! Stamps library and runtime details into `event.context`.

use crate::{Capabilities, Plugin, PluginResult, PluginType};
use async_trait::async_trait;
use events_core::{Context, IdentityProvider};
use serde_json::{json, Value};
use std::sync::Arc;

/// Library name reported in `context.library`.
pub const LIBRARY_NAME: &str = "events-sdk-rs";

/// Enrichment plugin adding `library`, `os`, `locale` and `sessionId`.
pub struct EnvironmentEnrichment {
    locale: Option<String>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl EnvironmentEnrichment {
    pub fn new(locale: Option<String>, identity: Option<Arc<dyn IdentityProvider>>) -> Self {
        Self { locale, identity }
    }

    fn enrich(&self, ctx: &mut Context) {
        let session_id = self.identity.as_ref().and_then(|i| i.session_id());
        let context = &mut ctx.event_mut().context;

        context.insert(
            "library".to_string(),
            json!({ "name": LIBRARY_NAME, "version": env!("CARGO_PKG_VERSION") }),
        );
        context
            .entry("os")
            .or_insert_with(|| json!({ "name": std::env::consts::OS, "arch": std::env::consts::ARCH }));
        if let Some(locale) = &self.locale {
            context
                .entry("locale")
                .or_insert_with(|| Value::String(locale.clone()));
        }
        if let Some(session_id) = session_id {
            context
                .entry("sessionId")
                .or_insert_with(|| Value::from(session_id));
        }
    }
}

#[async_trait]
impl Plugin for EnvironmentEnrichment {
    fn name(&self) -> &str {
        "Environment Enrichment"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Enrichment
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn track(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enrich(ctx);
        Ok(())
    }

    async fn identify(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enrich(ctx);
        Ok(())
    }

    async fn page(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enrich(ctx);
        Ok(())
    }

    async fn screen(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enrich(ctx);
        Ok(())
    }

    async fn group(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enrich(ctx);
        Ok(())
    }

    async fn alias(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enrich(ctx);
        Ok(())
    }
}
