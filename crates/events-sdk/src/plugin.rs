//! Plugin contract.
//!
//! A plugin declares its stage ([`PluginType`]) and the tracking methods it
//! handles ([`Capabilities`]). The capability set is read once, when the
//! plugin is registered; handlers for methods outside it are never called.

use crate::{Analytics, PluginResult};
use async_trait::async_trait;
use events_core::{Context, EventType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Pipeline stage a plugin runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Before,
    Enrichment,
    Destination,
    After,
    /// Loaded but never dispatched to.
    Utility,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Before => "before",
            PluginType::Enrichment => "enrichment",
            PluginType::Destination => "destination",
            PluginType::After => "after",
            PluginType::Utility => "utility",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracking method a context is dispatched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Track,
    Identify,
    Page,
    Screen,
    Group,
    Alias,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Track,
        Method::Identify,
        Method::Page,
        Method::Screen,
        Method::Group,
        Method::Alias,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Track => "track",
            Method::Identify => "identify",
            Method::Page => "page",
            Method::Screen => "screen",
            Method::Group => "group",
            Method::Alias => "alias",
        }
    }
}

impl From<EventType> for Method {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Track => Method::Track,
            EventType::Identify => Method::Identify,
            EventType::Page => Method::Page,
            EventType::Screen => Method::Screen,
            EventType::Group => Method::Group,
            EventType::Alias => Method::Alias,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of methods a plugin handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    methods: BTreeSet<Method>,
}

impl Capabilities {
    /// Every tracking method.
    pub fn all() -> Self {
        Self::only(Method::ALL)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn only(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }

    pub fn contains(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }
}

/// A processor invoked at one pipeline stage.
///
/// Handlers default to no-ops; implement the ones listed in
/// [`capabilities`](Plugin::capabilities).
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    fn plugin_type(&self) -> PluginType;

    fn is_loaded(&self) -> bool {
        true
    }

    /// Called once before registration completes. An error keeps the
    /// plugin out of the pipeline.
    async fn load(&self, _ctx: &mut Context, _analytics: &Analytics) -> PluginResult<()> {
        Ok(())
    }

    /// Called on deregistration and on close.
    async fn unload(&self, _ctx: &mut Context, _analytics: &Analytics) -> PluginResult<()> {
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn track(&self, _ctx: &mut Context) -> PluginResult<()> {
        Ok(())
    }

    async fn identify(&self, _ctx: &mut Context) -> PluginResult<()> {
        Ok(())
    }

    async fn page(&self, _ctx: &mut Context) -> PluginResult<()> {
        Ok(())
    }

    async fn screen(&self, _ctx: &mut Context) -> PluginResult<()> {
        Ok(())
    }

    async fn group(&self, _ctx: &mut Context) -> PluginResult<()> {
        Ok(())
    }

    async fn alias(&self, _ctx: &mut Context) -> PluginResult<()> {
        Ok(())
    }
}

/// Invoke the handler for `method`.
pub(crate) async fn invoke(plugin: &dyn Plugin, method: Method, ctx: &mut Context) -> PluginResult<()> {
    match method {
        Method::Track => plugin.track(ctx).await,
        Method::Identify => plugin.identify(ctx).await,
        Method::Page => plugin.page(ctx).await,
        Method::Screen => plugin.screen(ctx).await,
        Method::Group => plugin.group(ctx).await,
        Method::Alias => plugin.alias(ctx).await,
    }
}
