//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/insight/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/insight/` (~/.config/insight/)
//! - Data: `$XDG_DATA_HOME/insight/` (~/.local/share/insight/)
//! - State/Logs: `$XDG_STATE_HOME/insight/` (~/.local/state/insight/)

use crate::analytics::TimeRange;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Report configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Client context used when recording events from the CLI
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Report and aggregation configuration
#[derive(Debug, Deserialize)]
pub struct AnalyticsConfig {
    /// Length of the top pages / referrers / countries lists
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Look-back for the "users right now" counter
    #[serde(default = "default_realtime_window_minutes")]
    pub realtime_window_minutes: i64,

    /// Range used when none is given on the command line
    #[serde(default)]
    pub default_range: TimeRange,

    /// Offset from UTC, in minutes, for "today" and hour-of-day buckets.
    /// Uses the machine's local offset when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            realtime_window_minutes: default_realtime_window_minutes(),
            default_range: TimeRange::default(),
            utc_offset_minutes: None,
        }
    }
}

impl AnalyticsConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(Error::Config(
                "analytics.top_n must be at least 1".to_string(),
            ));
        }
        if self.realtime_window_minutes <= 0 {
            return Err(Error::Config(
                "analytics.realtime_window_minutes must be positive".to_string(),
            ));
        }
        if let Some(offset) = self.utc_offset_minutes {
            if offset.abs() >= 24 * 60 {
                return Err(Error::Config(
                    "analytics.utc_offset_minutes must be within +/- 1439".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn default_top_n() -> usize {
    10
}

fn default_realtime_window_minutes() -> i64 {
    5
}

/// Client context attached to events recorded from the command line.
///
/// A browser supplies these itself; the CLI reads them from config.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// User agent string to classify
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Referrer to attach to recorded events
    #[serde(default)]
    pub referrer: Option<String>,

    /// Country to attach to recorded events
    #[serde(default)]
    pub country: Option<String>,

    /// Screen resolution, e.g. "1920x1080"
    #[serde(default)]
    pub screen_resolution: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            referrer: None,
            country: None,
            screen_resolution: None,
        }
    }
}

fn default_user_agent() -> String {
    concat!("insight-cli/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.analytics.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/insight/config.toml` (~/.config/insight/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("insight").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/insight/` (~/.local/share/insight/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("insight")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/insight/` (~/.local/state/insight/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("insight")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/insight/data.db` (~/.local/share/insight/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the prefix of the daily log files
    ///
    /// Each day's file carries a `.YYYY-MM-DD` suffix; see
    /// [`crate::logging::log_file_path`].
    pub fn log_path() -> PathBuf {
        Self::state_dir().join(crate::logging::LOG_FILE_PREFIX)
    }
}
