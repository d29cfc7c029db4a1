//! Configuration management for clipd.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::LogFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "clipd";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "history.db";

/// Default socket file name.
const SOCKET_FILE_NAME: &str = "clipd.sock";

/// Default instance marker file name.
const PID_FILE_NAME: &str = "clipd.pid";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CLIPD_`, sections split on `__`)
/// 2. TOML config file at `~/.config/clipd/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Request server configuration.
    pub api: ApiConfig,
    /// Daemon configuration.
    pub daemon: DaemonConfig,
    /// Retention configuration.
    pub retention: RetentionConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/clipd/history.db`
    pub database_path: Option<PathBuf>,
}

/// Request server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Path to the Unix socket the server listens on.
    /// Defaults to `~/.local/share/clipd/clipd.sock`
    pub socket_path: Option<PathBuf>,
    /// Upper bound on handling a single request, in seconds.
    pub request_timeout_secs: u64,
}

/// Daemon-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Interval between clipboard checks in milliseconds.
    pub poll_interval_ms: u64,
    /// Grace period for the request server on shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Path to the instance marker.
    /// Defaults to `~/.local/share/clipd/clipd.pid`
    pub pid_file_path: Option<PathBuf>,
}

/// Retention-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Whether old entries are swept periodically.
    pub enabled: bool,
    /// Maximum age of entries to keep, in days.
    pub max_age_days: u32,
    /// Interval between sweeps, in hours.
    pub interval_hours: u32,
}

/// Logging-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log line format.
    pub format: LogFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            socket_path: None, // Will be resolved to default at runtime
            request_timeout_secs: 10,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            shutdown_timeout_secs: 5,
            pid_file_path: None,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: 30,
            interval_hours: 24,
        }
    }
}

/// Effective daemon settings, as reported by the reload signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonSettings {
    /// Interval between clipboard checks.
    pub poll_interval: Duration,
    /// Grace period for the request server on shutdown.
    pub shutdown_timeout: Duration,
    /// Whether the retention sweep runs.
    pub retention_enabled: bool,
    /// Maximum age of retained entries.
    pub retention_max_age: Duration,
    /// Interval between retention sweeps.
    pub retention_interval: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Config::default().daemon_settings()
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CLIPD_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.daemon.shutdown_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "shutdown_timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.api.request_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "request_timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.retention.enabled {
            if self.retention.max_age_days == 0 {
                return Err(Error::ConfigValidation {
                    message: "max_age_days must be greater than 0 when retention is enabled"
                        .to_string(),
                });
            }
            if self.retention.interval_hours == 0 {
                return Err(Error::ConfigValidation {
                    message: "interval_hours must be greater than 0 when retention is enabled"
                        .to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the socket path, resolving defaults if not set.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.api
            .socket_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(SOCKET_FILE_NAME))
    }

    /// Get the instance marker path, resolving defaults if not set.
    #[must_use]
    pub fn pid_file_path(&self) -> PathBuf {
        self.daemon
            .pid_file_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(PID_FILE_NAME))
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.poll_interval_ms)
    }

    /// Get the shutdown grace period as a Duration.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.shutdown_timeout_secs)
    }

    /// Get the per-request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Get the retention max age as a Duration.
    #[must_use]
    pub fn retention_max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention.max_age_days) * 24 * 60 * 60)
    }

    /// Get the retention sweep interval as a Duration.
    #[must_use]
    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention.interval_hours) * 60 * 60)
    }

    /// Snapshot the settings the daemon runs with.
    #[must_use]
    pub fn daemon_settings(&self) -> DaemonSettings {
        DaemonSettings {
            poll_interval: self.poll_interval(),
            shutdown_timeout: self.shutdown_timeout(),
            retention_enabled: self.retention.enabled,
            retention_max_age: self.retention_max_age(),
            retention_interval: self.retention_interval(),
        }
    }
}
