//! Application configuration management.
//!
//! Handles loading, saving, and accessing the sender's configuration:
//! database location, logging, transport timing, and dispatch policy.
//! Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{SmsError, SmsResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Dispatch run settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. If empty, uses default location.
    #[serde(default)]
    pub path: String,

    /// Enable WAL (Write-Ahead Logging) mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Run integrity check on startup.
    #[serde(default = "default_true")]
    pub integrity_check_on_startup: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Timeout for a single send call in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Latency of the simulated transport in milliseconds.
    #[serde(default = "default_simulated_latency")]
    pub simulated_latency_ms: u64,

    /// Probability (0.0..=1.0) that the simulated transport fails a send.
    #[serde(default)]
    pub simulated_failure_rate: f64,

    /// Probability (0.0..=1.0) that a sent message is reported delivered.
    #[serde(default = "default_delivery_rate")]
    pub simulated_delivery_rate: f64,
}

/// Dispatch run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Consecutive per-message failures after which the transport is treated
    /// as unusable and the run ends early. Zero disables the check.
    #[serde(default)]
    pub abort_after_consecutive_failures: u32,

    /// Buffer size of the delivery report channel.
    #[serde(default = "default_delivery_channel_capacity")]
    pub delivery_channel_capacity: usize,
}

// Default value functions for serde

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_send_timeout() -> u64 {
    constants::DEFAULT_SEND_TIMEOUT_MS
}

fn default_simulated_latency() -> u64 {
    250
}

fn default_delivery_rate() -> f64 {
    1.0
}

fn default_delivery_channel_capacity() -> usize {
    constants::DEFAULT_DELIVERY_CHANNEL_CAPACITY
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            wal_mode: true,
            pool_size: default_pool_size(),
            integrity_check_on_startup: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout(),
            simulated_latency_ms: default_simulated_latency(),
            simulated_failure_rate: 0.0,
            simulated_delivery_rate: default_delivery_rate(),
        }
    }
}

impl TransportConfig {
    /// Send timeout as a Duration.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Simulated latency as a Duration.
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            abort_after_consecutive_failures: 0,
            delivery_channel_capacity: default_delivery_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> SmsResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> SmsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> SmsResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| SmsError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> SmsResult<PathBuf> {
        let config_dir = Platform::config_dir()?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get the effective database path, using the configured path or the default.
    pub fn effective_db_path(&self) -> SmsResult<PathBuf> {
        if self.database.path.is_empty() {
            let data_dir = Platform::data_dir()?;
            Ok(data_dir.join("smssender.db"))
        } else {
            Ok(PathBuf::from(&self.database.path))
        }
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> SmsResult<PathBuf> {
        if self.logging.directory.is_empty() {
            let data_dir = Platform::data_dir()?;
            Ok(data_dir.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Reject values that cannot be acted on.
    pub fn validate(&self) -> SmsResult<()> {
        let rates = [
            ("transport.simulated_failure_rate", self.transport.simulated_failure_rate),
            ("transport.simulated_delivery_rate", self.transport.simulated_delivery_rate),
        ];
        for (name, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SmsError::Config(format!("{name} must be within 0.0..=1.0, got {rate}")));
            }
        }
        if self.transport.send_timeout_ms == 0 {
            return Err(SmsError::Config("transport.send_timeout_ms must be positive".into()));
        }
        if self.dispatch.delivery_channel_capacity == 0 {
            return Err(SmsError::Config(
                "dispatch.delivery_channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Thread-safe configuration holder for shared access across commands.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }
}
