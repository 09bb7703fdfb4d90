//! SDK error types.

use delivery_queue::{QueueError, StoreError, TransportError};
use events_core::ValidationError;
use routing_middleware::RoutingError;
use thiserror::Error;

/// Configuration error type.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Path error (e.g., home directory not found)
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Plugin error type.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Plugin `load` failed; the plugin was not registered
    #[error("Plugin {name} failed to load: {reason}")]
    Load { name: String, reason: String },

    /// Plugin handler failed
    #[error("Plugin {name} failed: {reason}")]
    Failed { name: String, reason: String },

    /// A plugin with this name is already registered
    #[error("Plugin {0} is already registered")]
    Duplicate(String),

    /// Destination middleware failed
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Event could not be converted to or from JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event could not be queued for delivery
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl PluginError {
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using PluginError.
pub type PluginResult<T> = Result<T, PluginError>;

/// SDK error type.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Event failed validation and never entered the pipeline
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Plugin error
    #[error("{0}")]
    Plugin(#[from] PluginError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Settings could not be fetched or parsed
    #[error("Settings error: {0}")]
    Settings(String),

    /// Transport setup error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The instance shut down before a buffered call could run
    #[error("Analytics instance closed before the call was processed")]
    Closed,
}

/// Result type alias using SdkError.
pub type SdkResult<T> = Result<T, SdkError>;
