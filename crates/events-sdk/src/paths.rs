//! File system paths for the SDK.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Manages file system paths for the SDK.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.events-sdk)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.events-sdk`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".events-sdk"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.events-sdk).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.events-sdk/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persisted queue database (~/.events-sdk/queue.sqlite).
    pub fn queue_database_file(&self) -> PathBuf {
        self.base_dir.join("queue.sqlite")
    }

    /// Get the logs directory (~/.events-sdk/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}
