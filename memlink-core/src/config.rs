//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/memlink/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/memlink/` (~/.config/memlink/)
//! - Data: `$XDG_DATA_HOME/memlink/` (~/.local/share/memlink/), holds the session token
//! - State/Logs: `$XDG_STATE_HOME/memlink/` (~/.local/state/memlink/)

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
    /// Memory backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Session token storage
    #[serde(default)]
    pub session: SessionConfig,

    /// Conversation capture settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Memory backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the memory server (e.g., `http://127.0.0.1:8000`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl BackendConfig {
    /// Backend config pointing at `base_url` with default timeouts.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(Error::Config("backend.base_url must not be empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "backend.base_url must start with http:// or https://, got {url:?}"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "backend.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Where the session token lives
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// Override path for the token file
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    /// Resolved token file path
    pub fn token_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Config::session_path)
    }
}

/// Conversation capture settings
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Transcripts shorter than this (after trimming) are not saved
    #[serde(default = "default_min_transcript_chars")]
    pub min_transcript_chars: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_transcript_chars: default_min_transcript_chars(),
        }
    }
}

fn default_min_transcript_chars() -> usize {
    10
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

        config.backend.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/memlink/config.toml` (~/.config/memlink/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("memlink").join("config.toml")
    }

    /// Returns the data directory path (for the session token)
    ///
    /// `$XDG_DATA_HOME/memlink/` (~/.local/share/memlink/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("memlink")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/memlink/` (~/.local/state/memlink/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("memlink")
    }

    /// Returns the default session token path
    ///
    /// `$XDG_DATA_HOME/memlink/session.json`
    pub fn session_path() -> PathBuf {
        Self::data_dir().join("session.json")
    }
}
