//! Configuration management for Atelier
//!
//! Loaded from `.atelier/config.toml` in the working directory. Every field
//! has a default so a missing file or a partial file both work.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{AtelierError, Result};

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtelierConfig {
    /// Concurrency cap per orchestrator instance
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,

    /// Per-task deadline in seconds; an apprentice exceeding it is failed
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout: u64,

    /// Scheduler tick period in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Root directory for ledger files
    #[serde(default = "default_ceremonies_dir")]
    pub ceremonies_dir: PathBuf,
}

fn default_max_concurrent_workers() -> usize {
    3
}

fn default_worker_timeout() -> u64 {
    1800
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_ceremonies_dir() -> PathBuf {
    PathBuf::from(".atelier/ceremonies")
}

impl Default for AtelierConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: default_max_concurrent_workers(),
            worker_timeout: default_worker_timeout(),
            poll_interval: default_poll_interval(),
            ceremonies_dir: default_ceremonies_dir(),
        }
    }
}

impl AtelierConfig {
    /// Load configuration from `.atelier/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".atelier/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| AtelierError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.atelier/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".atelier");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| AtelierError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Per-task deadline as a `Duration`
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout)
    }

    /// Scheduler tick period as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }
}
