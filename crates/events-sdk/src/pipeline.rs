//! Ordered plugin pipeline.
//!
//! Stage order is before → enrichment → destination → after; within a stage
//! plugins run in registration order. Dispatch works on a snapshot so the
//! registry lock is never held across a plugin call.

use crate::middleware::{apply_destination_middleware, DestinationMiddleware};
use crate::plugin::{invoke, Capabilities, Method, Plugin, PluginType};
use crate::{PluginError, PluginResult};
use events_core::{Context, LogLevel};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Destination name that targets every destination plugin.
pub const ALL_DESTINATIONS: &str = "*";

const STAGES: [PluginType; 4] = [
    PluginType::Before,
    PluginType::Enrichment,
    PluginType::Destination,
    PluginType::After,
];

#[derive(Clone)]
struct RegisteredPlugin {
    plugin: Arc<dyn Plugin>,
    plugin_type: PluginType,
    capabilities: Capabilities,
    /// Destination middleware, only used for destination plugins.
    middleware: Vec<Arc<dyn DestinationMiddleware>>,
}

/// Registry of loaded plugins.
#[derive(Default)]
pub struct Pipeline {
    plugins: Vec<RegisteredPlugin>,
    shared_middleware: Vec<Arc<dyn DestinationMiddleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin, capturing its type and capabilities.
    pub fn add(&mut self, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        let name = plugin.name().to_string();
        if self.plugins.iter().any(|p| p.plugin.name() == name) {
            return Err(PluginError::Duplicate(name));
        }

        let registered = RegisteredPlugin {
            plugin_type: plugin.plugin_type(),
            capabilities: plugin.capabilities(),
            middleware: Vec::new(),
            plugin,
        };
        debug!(plugin = %name, plugin_type = %registered.plugin_type, "Added plugin");
        self.plugins.push(registered);
        Ok(())
    }

    /// Remove a plugin by name.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Plugin>> {
        let index = self.plugins.iter().position(|p| p.plugin.name() == name)?;
        Some(self.plugins.remove(index).plugin)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .find(|p| p.plugin.name() == name)
            .map(|p| Arc::clone(&p.plugin))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.plugin.name() == name)
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins.iter().map(|p| Arc::clone(&p.plugin)).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.plugin.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Attach middleware to the named destination, or to every destination
    /// (present and future) with [`ALL_DESTINATIONS`]. Returns false when no
    /// destination plugin has that name.
    pub fn add_destination_middleware(
        &mut self,
        destination: &str,
        middleware: Arc<dyn DestinationMiddleware>,
    ) -> bool {
        if destination == ALL_DESTINATIONS {
            self.shared_middleware.push(middleware);
            return true;
        }

        match self
            .plugins
            .iter_mut()
            .find(|p| p.plugin_type == PluginType::Destination && p.plugin.name() == destination)
        {
            Some(registered) => {
                registered.middleware.push(middleware);
                true
            }
            None => false,
        }
    }

    /// Freeze the current registry for one dispatch.
    pub fn snapshot(&self) -> PipelineSnapshot {
        let entries = self
            .plugins
            .iter()
            .filter(|p| p.plugin_type != PluginType::Utility)
            .map(|p| {
                let mut entry = p.clone();
                if entry.plugin_type == PluginType::Destination {
                    let mut chain = self.shared_middleware.clone();
                    chain.append(&mut entry.middleware);
                    entry.middleware = chain;
                }
                entry
            })
            .collect();
        PipelineSnapshot { entries }
    }
}

/// Point-in-time view of the pipeline used for a single dispatch.
pub struct PipelineSnapshot {
    entries: Vec<RegisteredPlugin>,
}

impl PipelineSnapshot {
    /// Thread `ctx` through every stage. Plugin errors are recorded on the
    /// context; a cancellation stops everything that has not run yet.
    pub async fn dispatch(&self, mut ctx: Context, method: Method) -> Context {
        for stage in STAGES {
            for entry in self
                .entries
                .iter()
                .filter(|e| e.plugin_type == stage && e.capabilities.contains(method))
            {
                if ctx.is_cancelled() {
                    return ctx;
                }

                let name = entry.plugin.name();
                let result = if stage == PluginType::Destination {
                    if !ctx.event().integration_enabled(name) {
                        debug!(destination = %name, message_id = %ctx.event().message_id, "Destination disabled by integrations");
                        continue;
                    }
                    run_destination(entry, &mut ctx, method).await
                } else {
                    invoke(entry.plugin.as_ref(), method, &mut ctx).await
                };

                if let Err(e) = result {
                    record_error(&mut ctx, stage, name, &e);
                }
            }

            if ctx.is_cancelled() {
                debug!(message_id = %ctx.event().message_id, stage = %stage, "Dispatch halted by cancellation");
                return ctx;
            }
        }
        ctx
    }
}

async fn run_destination(
    entry: &RegisteredPlugin,
    ctx: &mut Context,
    method: Method,
) -> PluginResult<()> {
    let name = entry.plugin.name();
    let routed = apply_destination_middleware(name, ctx.event().clone(), &entry.middleware)?;

    let Some(event) = routed else {
        ctx.stats()
            .increment("destination_middleware_dropped", 1.0, &[format!("destination:{}", name)]);
        return Ok(());
    };

    let mut destination_ctx = ctx.for_destination(event);
    let result = invoke(entry.plugin.as_ref(), method, &mut destination_ctx).await;
    ctx.absorb(destination_ctx);
    result
}

fn record_error(ctx: &mut Context, stage: PluginType, name: &str, error: &PluginError) {
    warn!(
        plugin = %name,
        stage = %stage,
        message_id = %ctx.event().message_id,
        error = %error,
        "Plugin failed"
    );
    ctx.log(
        LogLevel::Error,
        format!("plugin {} failed", name),
        Some(json!({ "plugin": name, "error": error.to_string() })),
    );
    ctx.stats()
        .increment(&format!("{}_error", stage), 1.0, &[format!("plugin:{}", name)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::destination_middleware;
    use async_trait::async_trait;
    use events_core::{CancelationOptions, Event, EventType};
    use parking_lot::Mutex;
    use serde_json::Value;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: String,
        plugin_type: PluginType,
        capabilities: Capabilities,
        journal: Journal,
        fail: bool,
        cancel: bool,
    }

    impl Recorder {
        fn new(name: &str, plugin_type: PluginType, journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                plugin_type,
                capabilities: Capabilities::all(),
                journal: journal.clone(),
                fail: false,
                cancel: false,
            }
        }
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn plugin_type(&self) -> PluginType {
            self.plugin_type
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities.clone()
        }

        async fn track(&self, ctx: &mut Context) -> PluginResult<()> {
            self.journal
                .lock()
                .push(format!("{}:{}", self.name, ctx.event().event.clone().unwrap_or_default()));
            if self.cancel {
                ctx.cancel(CancelationOptions::drop("blocked"));
            }
            if self.fail {
                return Err(PluginError::failed(&self.name, "boom"));
            }
            Ok(())
        }
    }

    fn track(name: &str) -> Context {
        let mut event = Event::new(EventType::Track);
        event.event = Some(name.to_string());
        event.anonymous_id = Some("anon".to_string());
        Context::new(event)
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn counter(ctx: &Context, metric: &str) -> f64 {
        ctx.stats()
            .metrics()
            .iter()
            .filter(|m| m.metric == metric)
            .map(|m| m.value)
            .sum()
    }

    #[tokio::test]
    async fn test_stage_order_ignores_registration_order() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        pipeline.add(Arc::new(Recorder::new("after", PluginType::After, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("dest", PluginType::Destination, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("enrich", PluginType::Enrichment, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("before", PluginType::Before, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("util", PluginType::Utility, &j))).unwrap();

        pipeline.snapshot().dispatch(track("e"), Method::Track).await;

        assert_eq!(*j.lock(), vec!["before:e", "enrich:e", "dest:e", "after:e"]);
    }

    #[tokio::test]
    async fn test_plugin_error_recorded_and_siblings_continue() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        let mut failing = Recorder::new("failing", PluginType::Enrichment, &j);
        failing.fail = true;
        pipeline.add(Arc::new(failing)).unwrap();
        pipeline.add(Arc::new(Recorder::new("next", PluginType::Enrichment, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("dest", PluginType::Destination, &j))).unwrap();

        let ctx = pipeline.snapshot().dispatch(track("e"), Method::Track).await;

        assert_eq!(*j.lock(), vec!["failing:e", "next:e", "dest:e"]);
        assert_eq!(counter(&ctx, "enrichment_error"), 1.0);
        assert!(ctx.logs().iter().any(|l| l.level == LogLevel::Error));
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_in_before_stops_everything() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        let mut blocker = Recorder::new("blocker", PluginType::Before, &j);
        blocker.cancel = true;
        pipeline.add(Arc::new(blocker)).unwrap();
        pipeline.add(Arc::new(Recorder::new("second-before", PluginType::Before, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("dest", PluginType::Destination, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("after", PluginType::After, &j))).unwrap();

        let ctx = pipeline.snapshot().dispatch(track("e"), Method::Track).await;

        assert_eq!(*j.lock(), vec!["blocker:e"]);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_in_destination_stops_remaining_destinations() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        let mut first = Recorder::new("A", PluginType::Destination, &j);
        first.cancel = true;
        pipeline.add(Arc::new(first)).unwrap();
        pipeline.add(Arc::new(Recorder::new("B", PluginType::Destination, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("after", PluginType::After, &j))).unwrap();

        let ctx = pipeline.snapshot().dispatch(track("e"), Method::Track).await;

        assert_eq!(*j.lock(), vec!["A:e"]);
        assert!(ctx.is_cancelled());
        let cancelation = ctx.cancellation().unwrap();
        assert!(!cancelation.retry);
        assert_eq!(cancelation.reason.as_deref(), Some("blocked"));
        assert!(ctx.logs().iter().any(|l| l.message == "Context cancelled"));
    }

    #[tokio::test]
    async fn test_capabilities_filter_methods() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        let mut identify_only = Recorder::new("identify-only", PluginType::Enrichment, &j);
        identify_only.capabilities = Capabilities::only([Method::Identify]);
        pipeline.add(Arc::new(identify_only)).unwrap();

        pipeline.snapshot().dispatch(track("e"), Method::Track).await;
        assert!(j.lock().is_empty());
    }

    #[tokio::test]
    async fn test_integrations_gate_destinations() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        pipeline.add(Arc::new(Recorder::new("Amplitude", PluginType::Destination, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("Mixpanel", PluginType::Destination, &j))).unwrap();

        let mut ctx = track("e");
        ctx.event_mut().integrations.insert("All".into(), Value::Bool(false));
        ctx.event_mut().integrations.insert("Mixpanel".into(), Value::Bool(true));
        pipeline.snapshot().dispatch(ctx, Method::Track).await;

        assert_eq!(*j.lock(), vec!["Mixpanel:e"]);
    }

    #[tokio::test]
    async fn test_destination_middleware_drop_skips_one_destination() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        pipeline.add(Arc::new(Recorder::new("Amplitude", PluginType::Destination, &j))).unwrap();
        pipeline.add(Arc::new(Recorder::new("Mixpanel", PluginType::Destination, &j))).unwrap();
        assert!(pipeline.add_destination_middleware("Amplitude", destination_middleware(|_, _| None)));
        assert!(!pipeline.add_destination_middleware("Missing", destination_middleware(|_, e| Some(e))));

        let ctx = pipeline.snapshot().dispatch(track("e"), Method::Track).await;

        assert_eq!(*j.lock(), vec!["Mixpanel:e"]);
        assert_eq!(counter(&ctx, "destination_middleware_dropped"), 1.0);
    }

    #[tokio::test]
    async fn test_shared_middleware_applies_to_later_destinations() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        pipeline.add_destination_middleware(
            ALL_DESTINATIONS,
            destination_middleware(|_, mut e| {
                e.event = Some("rewritten".to_string());
                Some(e)
            }),
        );
        pipeline.add(Arc::new(Recorder::new("dest", PluginType::Destination, &j))).unwrap();

        let ctx = pipeline.snapshot().dispatch(track("e"), Method::Track).await;

        assert_eq!(*j.lock(), vec!["dest:rewritten"]);
        // The caller's event is untouched.
        assert_eq!(ctx.event().event.as_deref(), Some("e"));
    }

    #[test]
    fn test_registry_operations() {
        let j = journal();
        let mut pipeline = Pipeline::new();
        pipeline.add(Arc::new(Recorder::new("a", PluginType::Before, &j))).unwrap();
        let err = pipeline
            .add(Arc::new(Recorder::new("a", PluginType::After, &j)))
            .unwrap_err();
        assert!(matches!(err, PluginError::Duplicate(_)));

        assert_eq!(pipeline.names(), vec!["a"]);
        assert!(pipeline.remove("a").is_some());
        assert!(pipeline.remove("a").is_none());
        assert!(pipeline.is_empty());
    }
}
