//! Event collection SDK.
//!
//! This crate provides:
//! - Analytics: the instance handle, with a pre-init buffer that replays
//!   calls made before load in order
//! - Pipeline: before, enrichment, destination and after plugin stages
//! - Source and destination middleware, including CDN routing rules
//! - EventsApiDestination: the ingest destination backed by the delivery queue
//! - SdkConfig and Paths: file and environment configuration
//!
//! ```rust,ignore
//! let analytics = Analytics::new(Settings::new("write-key"));
//! let pending = analytics.track("Signed Up", Properties::new(), EventOptions::default());
//! analytics.load().await?;
//! let ctx = pending.await?;
//! ```

mod analytics;
mod buffer;
mod config;
mod emitter;
mod error;
mod middleware;
mod paths;
mod pipeline;
mod plugin;
pub mod plugins;
mod settings;

pub use analytics::{Analytics, AnalyticsBuilder, LoadOutcome, SdkFuture};
pub use buffer::LoadState;
pub use config::{
    DeliveryStrategyConfig, SdkConfig, DEFAULT_LOG_LEVEL, ENV_API_HOST, ENV_LOG_LEVEL,
};
pub use emitter::{
    Emission, Emitter, Listener, EVENT_DELIVERY_FAILURE, EVENT_DEREGISTER, EVENT_INITIALIZE,
    EVENT_REGISTER,
};
pub use error::{
    ConfigError, ConfigResult, PluginError, PluginResult, SdkError, SdkResult,
};
pub use middleware::{
    destination_middleware, source_middleware, DestinationMiddleware, SourceMiddleware,
};
pub use paths::Paths;
pub use pipeline::{Pipeline, PipelineSnapshot, ALL_DESTINATIONS};
pub use plugin::{Capabilities, Method, Plugin, PluginType};
pub use settings::{
    CdnSettings, CdnSettingsLoader, MiddlewareSettings, Settings, SettingsLoader,
    UpdateCdnSettings, DEFAULT_CDN_URL,
};
