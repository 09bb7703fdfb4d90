//! SDK configuration.

use crate::{ConfigResult, Paths};
use delivery_queue::{
    DeliveryStrategy, HttpTransportConfig, WorkerConfig, DEFAULT_API_HOST, DEFAULT_MAX_ATTEMPTS,
};
use observability::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding `log_level`.
pub const ENV_LOG_LEVEL: &str = "EVENTS_SDK_LOG_LEVEL";

/// Environment variable overriding `api_host`.
pub const ENV_API_HOST: &str = "EVENTS_SDK_API_HOST";

/// How the ingest destination sends events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DeliveryStrategyConfig {
    #[default]
    Standard,
    Batching { size: usize, timeout_ms: u64 },
}

impl From<&DeliveryStrategyConfig> for DeliveryStrategy {
    fn from(config: &DeliveryStrategyConfig) -> Self {
        match config {
            DeliveryStrategyConfig::Standard => DeliveryStrategy::Standard,
            DeliveryStrategyConfig::Batching { size, timeout_ms } => DeliveryStrategy::Batching {
                size: *size,
                timeout: Duration::from_millis(*timeout_ms),
            },
        }
    }
}

/// SDK configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Also write JSONL logs under the logs directory.
    pub log_to_file: bool,
    /// Ingest host, without scheme.
    pub api_host: String,
    /// `https` unless overridden.
    pub protocol: String,
    /// Retry failed deliveries. When false, a failed event is dropped after
    /// one attempt.
    pub retry_queue: bool,
    /// Keep the delivery queue in memory only.
    pub disable_client_persistence: bool,
    /// Failed attempts tolerated before an event is dropped.
    pub max_attempts: u32,
    /// Delivery worker tick in milliseconds.
    pub flush_interval_ms: u64,
    pub delivery_strategy: DeliveryStrategyConfig,
    /// HTTP client timeout in seconds.
    pub request_timeout_secs: u64,
    /// Queued events older than this are dropped. `None` keeps them forever.
    pub max_residency_secs: Option<u64>,
    /// Persisted queue database. Defaults to `~/.events-sdk/queue.sqlite`.
    pub storage_path: Option<PathBuf>,
    /// Locale stamped into `context.locale`.
    pub locale: Option<String>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_to_file: false,
            api_host: DEFAULT_API_HOST.to_string(),
            protocol: "https".to_string(),
            retry_queue: true,
            disable_client_persistence: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            flush_interval_ms: 500,
            delivery_strategy: DeliveryStrategyConfig::Standard,
            request_timeout_secs: 30,
            max_residency_secs: Some(24 * 60 * 60),
            storage_path: None,
            locale: None,
        }
    }
}

impl SdkConfig {
    /// Create a new SdkConfig with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SdkConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
        if let Ok(api_host) = std::env::var(ENV_API_HOST) {
            self.api_host = api_host;
        }
    }

    /// Attempts allowed by the queue: zero when retries are disabled.
    pub fn effective_max_attempts(&self) -> u32 {
        if self.retry_queue {
            self.max_attempts
        } else {
            0
        }
    }

    /// Worker settings for the named destination.
    pub fn worker_config(&self, destination: &str) -> WorkerConfig {
        WorkerConfig {
            destination: destination.to_string(),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            strategy: DeliveryStrategy::from(&self.delivery_strategy),
            max_residency: self.max_residency_secs.map(Duration::from_secs),
        }
    }

    /// HTTP transport settings for the given write key.
    pub fn transport_config(&self, write_key: &str) -> HttpTransportConfig {
        HttpTransportConfig {
            write_key: write_key.to_string(),
            api_host: self.api_host.clone(),
            protocol: self.protocol.clone(),
            timeout_secs: self.request_timeout_secs,
        }
    }

    /// Logging setup for hosts that let the SDK own the subscriber.
    pub fn log_config(&self, paths: &Paths) -> LogConfig {
        LogConfig {
            service_name: "events-sdk".to_string(),
            default_level: self.log_level.clone(),
            log_file: self.log_to_file,
            log_path: Some(paths.logs_dir().join("sdk.jsonl")),
            also_stderr: true,
        }
    }

    /// Path of the persisted queue database.
    pub fn storage_path(&self, paths: &Paths) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(|| paths.queue_database_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_host, DEFAULT_API_HOST);
        assert!(config.retry_queue);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.delivery_strategy, DeliveryStrategyConfig::Standard);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "retry_queue": false,
            "delivery_strategy": {"strategy": "batching", "size": 20, "timeout_ms": 5000}
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = SdkConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.effective_max_attempts(), 0);
        assert_eq!(config.protocol, "https");
        assert_eq!(
            DeliveryStrategy::from(&config.delivery_strategy),
            DeliveryStrategy::Batching {
                size: 20,
                timeout: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = SdkConfig {
            locale: Some("en-US".to_string()),
            ..SdkConfig::default()
        };
        config.save(&paths).unwrap();

        let loaded = SdkConfig::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.locale.as_deref(), Some("en-US"));
        assert_eq!(
            config.storage_path(&paths),
            dir.path().join("queue.sqlite")
        );
    }

    #[test]
    fn test_worker_config() {
        let config = SdkConfig {
            flush_interval_ms: 250,
            max_residency_secs: None,
            ..SdkConfig::default()
        };
        let worker = config.worker_config("Events API");
        assert_eq!(worker.destination, "Events API");
        assert_eq!(worker.flush_interval, Duration::from_millis(250));
        assert_eq!(worker.strategy, DeliveryStrategy::Standard);
        assert!(worker.max_residency.is_none());
    }
}
