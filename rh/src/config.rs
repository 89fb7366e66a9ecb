//! rsshub configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerConfig;
use crate::scheduler::config::DEFAULT_INTERVAL;

/// Overrides the seeded default poll interval
pub const ENV_TIMER_INTERVAL: &str = "CLI_APP_TIMER_INTERVAL";

/// Overrides the seeded default worker count
pub const ENV_WORKERS_COUNT: &str = "CLI_APP_WORKERS_COUNT";

/// Main rsshub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Fetch defaults
    pub fetch: FetchConfig,

    /// Scheduler limits
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: rsshub.yml
        let local_config = PathBuf::from("rsshub.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/rsshub/rsshub.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rsshub").join("rsshub.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::debug!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `CLI_APP_TIMER_INTERVAL` / `CLI_APP_WORKERS_COUNT`
    ///
    /// An unparseable worker count is ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(interval) = lookup(ENV_TIMER_INTERVAL)
            && !interval.trim().is_empty()
        {
            self.fetch.default_interval = interval.trim().to_string();
        }

        if let Some(workers) = lookup(ENV_WORKERS_COUNT) {
            match workers.trim().parse::<usize>() {
                Ok(n) => self.fetch.default_workers = n,
                Err(e) => tracing::warn!("Ignoring {}={:?}: {}", ENV_WORKERS_COUNT, workers, e),
            }
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; the singleton lock file lives next to it
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = dirs::data_local_dir()
            .map(|d| d.join("rsshub"))
            .unwrap_or_else(|| PathBuf::from(".rsshub"))
            .join("rsshub.db");
        Self { db_path }
    }
}

/// Fetch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Poll interval seeded into an empty store
    #[serde(rename = "default-interval")]
    pub default_interval: String,

    /// Worker count seeded into an empty store
    #[serde(rename = "default-workers")]
    pub default_workers: usize,

    /// Per-fetch deadline in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// User-Agent header sent with every fetch
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_INTERVAL.to_string(),
            default_workers: 3,
            timeout_ms: 30_000,
            user_agent: format!("rsshub/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    /// Per-fetch deadline as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
