//! # Observability
//!
//! Tracing initialization shared by the events SDK crates.
//!
//! Library code only uses the standard `tracing` macros. Host applications
//! call `observability::init()` once at startup to decide where the output
//! goes: a compact stderr layer for immediate feedback and, optionally, a
//! JSONL file with one structured entry per line.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("my-app");
//!     tracing::info!("ready");
//! }
//! ```
//!
//! Or with configuration:
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "my-app".into(),
//!     default_level: "debug".into(),
//!     log_file: true,
//!     ..Default::default()
//! });
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file::{default_log_path, LogFileWriter};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL entry.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Write JSONL entries to `log_path`.
    pub log_file: bool,

    /// Custom log file path. Defaults to `~/.events-sdk/logs/sdk.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "events-sdk".into(),
            default_level: "info".into(),
            log_file: false,
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Does nothing if a global subscriber is already installed. A log file
/// that cannot be opened is reported on stderr and skipped.
pub fn init_with_config(config: LogConfig) {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let mut file_error = None;
    let json_layer = if config.log_file {
        match config.log_path.clone().or_else(default_log_path) {
            Some(path) => match LogFileWriter::new(&path) {
                Ok(writer) => Some(JsonLayer::new(config.service_name.clone(), writer)),
                Err(e) => {
                    file_error = Some(format!("failed to open log file {}: {}", path.display(), e));
                    None
                }
            },
            None => {
                file_error = Some("could not determine home directory for log file".to_string());
                None
            }
        }
    } else {
        None
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer.map(|l| l.with_filter(env_filter())))
        .with(stderr_layer.map(|l| l.with_filter(env_filter())))
        .try_init()
        .is_ok();

    if installed {
        if let Some(error) = file_error {
            tracing::warn!(error = %error, "JSONL logging disabled");
        }
        tracing::debug!(service = %config.service_name, "observability initialized");
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
