//! The `Analytics` handle.
//!
//! A cheap, clonable handle around one SDK instance. Tracking calls made
//! before [`Analytics::load`] finishes are buffered and replayed in order;
//! afterwards they run straight through the plugin pipeline.

use crate::buffer::{BufferedCall, EventBuilder, FlushBatch, LoadState, PreInitBuffer};
use crate::emitter::{Emission, Emitter, Listener, EVENT_DEREGISTER, EVENT_INITIALIZE, EVENT_REGISTER};
use crate::middleware::{apply_source_middleware, DestinationMiddleware, SourceMiddleware};
use crate::pipeline::{Pipeline, ALL_DESTINATIONS};
use crate::plugins::{EnvironmentEnrichment, EventsApiDestination, EVENTS_API};
use crate::settings::{CdnSettings, CdnSettingsLoader, Settings, SettingsLoader, UpdateCdnSettings};
use crate::{Method, Paths, Plugin, PluginError, SdkConfig, SdkError, SdkResult};
use delivery_queue::{
    AlwaysOnline, ConnectivityProbe, HttpTransport, KeyValueStore, SqliteStore, Transport,
};
use events_core::{
    validate_event, CancelationOptions, Context, Event, EventFactory, EventOptions, EventType,
    IdentityProvider, LogLevel, MemoryIdentity, Properties,
};
use parking_lot::{Mutex, RwLock};
use routing_middleware::RoutingMiddleware;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Future returned by calls that may be buffered.
pub type SdkFuture<T> = Pin<Box<dyn Future<Output = SdkResult<T>> + Send>>;

/// Result of [`Analytics::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// `load` already ran (or is running); nothing was flushed.
    AlreadyLoaded,
}

struct AnalyticsInner {
    settings: Settings,
    config: SdkConfig,
    factory: EventFactory,
    emitter: Emitter,
    pipeline: RwLock<Pipeline>,
    buffer: Mutex<PreInitBuffer>,
    source_middleware: RwLock<Vec<Arc<dyn SourceMiddleware>>>,
    cdn_settings: RwLock<Option<CdnSettings>>,
    initial_plugins: Mutex<Vec<Arc<dyn Plugin>>>,
    settings_loader: Option<Arc<dyn SettingsLoader>>,
    update_cdn_settings: Option<UpdateCdnSettings>,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    probe: Arc<dyn ConnectivityProbe>,
    paths: Option<Paths>,
}

/// Builder for [`Analytics`].
pub struct AnalyticsBuilder {
    settings: Settings,
    config: SdkConfig,
    identity: Option<Arc<dyn IdentityProvider>>,
    plugins: Vec<Arc<dyn Plugin>>,
    settings_loader: Option<Arc<dyn SettingsLoader>>,
    update_cdn_settings: Option<UpdateCdnSettings>,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    paths: Option<Paths>,
}

impl AnalyticsBuilder {
    pub fn config(mut self, config: SdkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Plugins registered during load, after the built-in ones.
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn settings_loader(mut self, loader: Arc<dyn SettingsLoader>) -> Self {
        self.settings_loader = Some(loader);
        self
    }

    /// Rewrite CDN settings after they are resolved.
    pub fn update_cdn_settings(
        mut self,
        update: impl Fn(CdnSettings) -> CdnSettings + Send + Sync + 'static,
    ) -> Self {
        self.update_cdn_settings = Some(Arc::new(update));
        self
    }

    /// Key/value store for the persisted delivery queue.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Transport used by the ingest destination instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn paths(mut self, paths: Paths) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn build(self) -> Analytics {
        let identity = self
            .identity
            .unwrap_or_else(|| Arc::new(MemoryIdentity::new()));

        Analytics {
            inner: Arc::new(AnalyticsInner {
                settings: self.settings,
                config: self.config,
                factory: EventFactory::new(identity),
                emitter: Emitter::new(),
                pipeline: RwLock::new(Pipeline::new()),
                buffer: Mutex::new(PreInitBuffer::new()),
                source_middleware: RwLock::new(Vec::new()),
                cdn_settings: RwLock::new(None),
                initial_plugins: Mutex::new(self.plugins),
                settings_loader: self.settings_loader,
                update_cdn_settings: self.update_cdn_settings,
                store: self.store,
                transport: self.transport,
                probe: self.probe.unwrap_or_else(|| Arc::new(AlwaysOnline)),
                paths: self.paths,
            }),
        }
    }
}

/// Handle to one SDK instance.
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<AnalyticsInner>,
}

impl Analytics {
    pub fn builder(settings: Settings) -> AnalyticsBuilder {
        AnalyticsBuilder {
            settings,
            config: SdkConfig::new(),
            identity: None,
            plugins: Vec::new(),
            settings_loader: None,
            update_cdn_settings: None,
            store: None,
            transport: None,
            probe: None,
            paths: None,
        }
    }

    pub fn new(settings: Settings) -> Self {
        Self::builder(settings).build()
    }

    pub fn write_key(&self) -> &str {
        &self.inner.settings.write_key
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        self.inner.factory.identity()
    }

    pub fn emitter(&self) -> &Emitter {
        &self.inner.emitter
    }

    /// CDN settings in effect, once loaded.
    pub fn cdn_settings(&self) -> Option<CdnSettings> {
        self.inner.cdn_settings.read().clone()
    }

    pub fn load_state(&self) -> LoadState {
        self.inner.buffer.lock().state()
    }

    /// Number of calls waiting for load.
    pub fn buffered_len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.inner.pipeline.read().names()
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner.pipeline.read().get(name)
    }

    // Tracking calls

    pub fn track(&self, event: &str, properties: Properties, options: EventOptions) -> SdkFuture<Context> {
        let event = event.to_string();
        self.call(Box::new(move |f| f.track(&event, properties, options)))
    }

    /// Identify the current user. A given `user_id` is stored on the
    /// identity provider for later calls.
    pub fn identify(&self, user_id: Option<&str>, traits: Properties, options: EventOptions) -> SdkFuture<Context> {
        let user_id = user_id.map(str::to_string);
        self.call(Box::new(move |f| {
            if let Some(user_id) = &user_id {
                f.identity().set_user_id(Some(user_id.clone()));
            }
            f.identify(user_id.as_deref(), traits, options)
        }))
    }

    pub fn page(
        &self,
        category: Option<&str>,
        name: Option<&str>,
        properties: Properties,
        options: EventOptions,
    ) -> SdkFuture<Context> {
        let category = category.map(str::to_string);
        let name = name.map(str::to_string);
        self.call(Box::new(move |f| {
            f.page(category.as_deref(), name.as_deref(), properties, options)
        }))
    }

    pub fn screen(
        &self,
        category: Option<&str>,
        name: Option<&str>,
        properties: Properties,
        options: EventOptions,
    ) -> SdkFuture<Context> {
        let category = category.map(str::to_string);
        let name = name.map(str::to_string);
        self.call(Box::new(move |f| {
            f.screen(category.as_deref(), name.as_deref(), properties, options)
        }))
    }

    pub fn group(&self, group_id: &str, traits: Properties, options: EventOptions) -> SdkFuture<Context> {
        let group_id = group_id.to_string();
        self.call(Box::new(move |f| f.group(&group_id, traits, options)))
    }

    pub fn alias(&self, to: &str, from: Option<&str>, options: EventOptions) -> SdkFuture<Context> {
        let to = to.to_string();
        let from = from.map(str::to_string);
        self.call(Box::new(move |f| f.alias(&to, from.as_deref(), options)))
    }

    /// Route a tracking call through the buffer or straight to the pipeline.
    ///
    /// Buffering happens before this returns, so call order is preserved
    /// even if the futures are awaited out of order.
    fn call(&self, build: EventBuilder) -> SdkFuture<Context> {
        let (reply, rx) = oneshot::channel();
        let rejected = self.inner.buffer.lock().offer(BufferedCall::Dispatch { build, reply });

        match rejected {
            None => Box::pin(async move { rx.await.map_err(|_| SdkError::Closed)? }),
            Some(BufferedCall::Dispatch { build, .. }) => {
                if self.load_state() == LoadState::Closed {
                    return Box::pin(async { Err(SdkError::Closed) });
                }
                let this = self.clone();
                Box::pin(async move { this.run(build).await })
            }
            Some(_) => Box::pin(async { Err(SdkError::Closed) }),
        }
    }

    async fn run(&self, build: EventBuilder) -> SdkResult<Context> {
        let event = build(&self.inner.factory);
        validate_event(&event)?;
        Ok(self.process(event).await)
    }

    /// Source middleware, pipeline dispatch, then the per-method emission.
    async fn process(&self, event: Event) -> Context {
        let method = Method::from(event.event_type);
        let mut ctx = Context::new(event);

        let chain = self.inner.source_middleware.read().clone();
        match apply_source_middleware(ctx.event().clone(), &chain) {
            Ok(Some(event)) => ctx.update_event(event),
            Ok(None) => ctx.cancel(CancelationOptions::drop("dropped by source middleware")),
            Err(e) => {
                warn!(message_id = %ctx.event().message_id, error = %e, "Source middleware failed");
                ctx.log(
                    LogLevel::Error,
                    "source middleware failed",
                    Some(json!({ "error": e.to_string() })),
                );
            }
        }

        if !ctx.is_cancelled() {
            let snapshot = self.inner.pipeline.read().snapshot();
            ctx = snapshot.dispatch(ctx, method).await;
        }

        self.inner.emitter.emit(
            method.as_str(),
            &Emission::Dispatched {
                event: ctx.event().clone(),
                cancelled: ctx.is_cancelled(),
            },
        );
        ctx
    }

    // Identity and listeners

    /// Set the anonymous id. Buffered calls made before load see it.
    pub fn set_anonymous_id(&self, anonymous_id: Option<String>) {
        let rejected = self
            .inner
            .buffer
            .lock()
            .offer(BufferedCall::SetAnonymousId(anonymous_id));
        if let Some(BufferedCall::SetAnonymousId(anonymous_id)) = rejected {
            self.identity().set_anonymous_id(anonymous_id);
        }
    }

    /// Register a listener for a named event (`track`, `initialize`,
    /// `delivery_failure`, ...).
    pub fn on(&self, event_name: &str, listener: Listener) {
        let rejected = self.inner.buffer.lock().offer(BufferedCall::On {
            event_name: event_name.to_string(),
            listener,
        });
        if let Some(BufferedCall::On { event_name, listener }) = rejected {
            self.inner.emitter.on(&event_name, listener);
        }
    }

    // Middleware

    /// Add middleware that runs before every plugin.
    pub fn add_source_middleware(&self, middleware: Arc<dyn SourceMiddleware>) {
        self.inner.source_middleware.write().push(middleware);
    }

    /// Add middleware for one destination, or for all with `"*"`.
    pub fn add_destination_middleware(&self, destination: &str, middleware: Arc<dyn DestinationMiddleware>) {
        let rejected = self.inner.buffer.lock().offer(BufferedCall::DestinationMiddleware {
            destination: destination.to_string(),
            middleware,
        });
        if let Some(BufferedCall::DestinationMiddleware {
            destination,
            middleware,
        }) = rejected
        {
            self.attach_destination_middleware(&destination, middleware);
        }
    }

    fn attach_destination_middleware(&self, destination: &str, middleware: Arc<dyn DestinationMiddleware>) {
        if !self
            .inner
            .pipeline
            .write()
            .add_destination_middleware(destination, middleware)
        {
            warn!(destination = %destination, "No destination with this name; middleware ignored");
        }
    }

    // Plugins

    /// Load and add plugins. A plugin whose `load` fails is not added and
    /// its error is returned.
    pub fn register(&self, plugins: Vec<Arc<dyn Plugin>>) -> SdkFuture<()> {
        let (reply, rx) = oneshot::channel();
        let rejected = self
            .inner
            .buffer
            .lock()
            .offer(BufferedCall::Register { plugins, reply });

        match rejected {
            None => Box::pin(async move { rx.await.map_err(|_| SdkError::Closed)? }),
            Some(BufferedCall::Register { plugins, .. }) => {
                let this = self.clone();
                Box::pin(async move { this.register_now(plugins).await })
            }
            Some(_) => Box::pin(async { Err(SdkError::Closed) }),
        }
    }

    async fn register_now(&self, plugins: Vec<Arc<dyn Plugin>>) -> SdkResult<()> {
        let mut names = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            let name = plugin.name().to_string();
            if self.inner.pipeline.read().contains(&name) {
                return Err(PluginError::Duplicate(name).into());
            }

            let mut ctx = system_context();
            if let Err(e) = plugin.load(&mut ctx, self).await {
                warn!(plugin = %name, error = %e, "Plugin failed to load");
                return Err(PluginError::Load {
                    name,
                    reason: e.to_string(),
                }
                .into());
            }

            self.inner.pipeline.write().add(plugin)?;
            info!(plugin = %name, "Registered plugin");
            names.push(name);
        }

        if !names.is_empty() {
            self.inner
                .emitter
                .emit(EVENT_REGISTER, &Emission::Plugins { names });
        }
        Ok(())
    }

    /// Remove plugins by name, calling their `unload`. Unknown names are
    /// ignored.
    pub async fn deregister(&self, names: &[&str]) -> SdkResult<()> {
        let mut removed = Vec::new();
        for name in names {
            let plugin = self.inner.pipeline.write().remove(name);
            let Some(plugin) = plugin else {
                debug!(plugin = %name, "Deregister: no such plugin");
                continue;
            };

            let mut ctx = system_context();
            if let Err(e) = plugin.unload(&mut ctx, self).await {
                warn!(plugin = %name, error = %e, "Plugin failed to unload");
            }
            info!(plugin = %name, "Deregistered plugin");
            removed.push(name.to_string());
        }

        if !removed.is_empty() {
            self.inner
                .emitter
                .emit(EVENT_DEREGISTER, &Emission::Plugins { names: removed });
        }
        Ok(())
    }

    // Lifecycle

    /// Resolve settings, register plugins and replay buffered calls.
    ///
    /// Runs once per instance; later calls return
    /// [`LoadOutcome::AlreadyLoaded`] without flushing anything.
    pub async fn load(&self) -> SdkResult<LoadOutcome> {
        if !self.inner.buffer.lock().begin_load() {
            warn!(write_key = %self.write_key(), "Analytics already loaded");
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        let cdn_settings = self.resolve_cdn_settings().await;
        *self.inner.cdn_settings.write() = Some(cdn_settings.clone());

        if !cdn_settings.routing_rules().is_empty() {
            debug!(rules = cdn_settings.routing_rules().len(), "Installing routing middleware");
            self.inner.pipeline.write().add_destination_middleware(
                ALL_DESTINATIONS,
                Arc::new(RoutingMiddleware::new(cdn_settings.routing_rules().to_vec())),
            );
        }

        // Identity and listeners first, so buffered events see them.
        let first = self.inner.buffer.lock().drain();
        let FlushBatch {
            anonymous_ids,
            listeners,
            registrations,
            middleware,
            dispatches,
        } = first;
        self.apply_identity_and_listeners(anonymous_ids, listeners);

        for plugin in self.default_plugins(&cdn_settings) {
            let name = plugin.name().to_string();
            if let Err(e) = self.register_now(vec![plugin]).await {
                warn!(plugin = %name, error = %e, "Skipping plugin");
            }
        }

        self.flush(FlushBatch {
            anonymous_ids: Vec::new(),
            listeners: Vec::new(),
            registrations,
            middleware,
            dispatches,
        })
        .await;

        loop {
            let next = self.inner.buffer.lock().next_batch_or_ready();
            match next {
                Some(batch) => self.flush(batch).await,
                None => break,
            }
        }

        info!(write_key = %self.write_key(), plugins = ?self.plugin_names(), "Analytics ready");
        self.inner.emitter.emit(
            EVENT_INITIALIZE,
            &Emission::Initialize {
                write_key: self.write_key().to_string(),
            },
        );
        Ok(LoadOutcome::Loaded)
    }

    /// Unload every plugin and reject further calls.
    pub async fn close(&self) -> SdkResult<()> {
        let dropped = self.inner.buffer.lock().close();
        if dropped > 0 {
            warn!(dropped, "Closing with buffered calls");
        }

        let names = self.plugin_names();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.deregister(&names).await
    }

    fn apply_identity_and_listeners(
        &self,
        anonymous_ids: Vec<Option<String>>,
        listeners: Vec<(String, Listener)>,
    ) {
        for anonymous_id in anonymous_ids {
            self.identity().set_anonymous_id(anonymous_id);
        }
        for (event_name, listener) in listeners {
            self.inner.emitter.on(&event_name, listener);
        }
    }

    async fn flush(&self, batch: FlushBatch) {
        self.apply_identity_and_listeners(batch.anonymous_ids, batch.listeners);

        for (plugins, reply) in batch.registrations {
            let _ = reply.send(self.register_now(plugins).await);
        }
        for (destination, middleware) in batch.middleware {
            self.attach_destination_middleware(&destination, middleware);
        }

        debug!(calls = batch.dispatches.len(), "Replaying buffered calls");
        for (build, reply) in batch.dispatches {
            let _ = reply.send(self.run(build).await);
        }
    }

    async fn resolve_cdn_settings(&self) -> CdnSettings {
        let settings = match &self.inner.settings.cdn_settings {
            Some(settings) => settings.clone(),
            None => match self.fetch_cdn_settings().await {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(error = %e, "Could not load CDN settings; using defaults");
                    CdnSettings::default()
                }
            },
        };

        match &self.inner.update_cdn_settings {
            Some(update) => update(settings),
            None => settings,
        }
    }

    async fn fetch_cdn_settings(&self) -> SdkResult<CdnSettings> {
        let write_key = self.write_key();
        match &self.inner.settings_loader {
            Some(loader) => loader.load(write_key).await,
            None => {
                CdnSettingsLoader::new(self.inner.settings.cdn_url.as_deref())?
                    .load(write_key)
                    .await
            }
        }
    }

    /// Built-in plugins followed by the builder's plugins.
    fn default_plugins(&self, cdn_settings: &CdnSettings) -> Vec<Arc<dyn Plugin>> {
        let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(EnvironmentEnrichment::new(
            self.inner.config.locale.clone(),
            Some(Arc::clone(self.identity())),
        ))];

        let ingest_disabled = matches!(cdn_settings.integrations.get(EVENTS_API), Some(Value::Bool(false)));
        if self.inner.settings.integration_enabled(EVENTS_API) && !ingest_disabled {
            match self.ingest_transport() {
                Ok(transport) => plugins.push(Arc::new(EventsApiDestination::from_config(
                    self.write_key(),
                    &self.inner.config,
                    self.queue_store(),
                    transport,
                    Arc::clone(&self.inner.probe),
                ))),
                Err(e) => warn!(error = %e, "Could not build ingest transport; Events API disabled"),
            }
        } else {
            debug!("Events API destination disabled by settings");
        }

        plugins.extend(self.inner.initial_plugins.lock().drain(..));
        plugins
    }

    fn ingest_transport(&self) -> SdkResult<Arc<dyn Transport>> {
        match &self.inner.transport {
            Some(transport) => Ok(Arc::clone(transport)),
            None => Ok(Arc::new(HttpTransport::new(
                self.inner.config.transport_config(self.write_key()),
            )?)),
        }
    }

    /// Store backing the persisted queue, if persistence is possible.
    fn queue_store(&self) -> Option<Arc<dyn KeyValueStore>> {
        if self.inner.config.disable_client_persistence {
            return None;
        }
        if let Some(store) = &self.inner.store {
            return Some(Arc::clone(store));
        }

        let paths = match &self.inner.paths {
            Some(paths) => paths.clone(),
            None => match Paths::new() {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(error = %e, "No data directory; delivery queue kept in memory");
                    return None;
                }
            },
        };

        let path = self.inner.config.storage_path(&paths);
        match SqliteStore::open(&path) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not open queue store; delivery queue kept in memory");
                None
            }
        }
    }
}

/// Context handed to plugin `load`/`unload`.
fn system_context() -> Context {
    let mut event = Event::new(EventType::Track);
    event.event = Some("system".to_string());
    Context::new(event)
}
