//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/scribe/config.toml)
//! 3. Environment variables (SCRIBE_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::remote::UrlMode;
use crate::storage::naming::STORE_PREFIX;

/// Environment variable prefix
const ENV_PREFIX: &str = "SCRIBE";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the local stores, their index databases and the sync log
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Origin the application is served from (stands in for the browser location)
    #[serde(default)]
    pub app_origin: Option<String>,

    /// Explicit remote database URL, bypassing origin-based resolution
    #[serde(default)]
    pub remote_url: Option<String>,

    /// How the remote URL is derived from the origin
    #[serde(default)]
    pub url_mode: UrlMode,

    /// Basic auth user for the remote store
    #[serde(default)]
    pub remote_username: Option<String>,

    /// Basic auth password for the remote store
    #[serde(default)]
    pub remote_password: Option<String>,

    /// Whether live sync starts automatically after a store is opened
    #[serde(default = "default_true")]
    pub sync_enabled: bool,

    /// Store whose index databases are never cleaned up
    #[serde(default = "default_reserved_store")]
    pub reserved_store: String,

    /// Storage quota used for health checks; no quota disables the check
    #[serde(default)]
    pub storage_quota_bytes: Option<u64>,

    /// Seconds between remote polls while live sync is idle
    #[serde(default = "default_poll_interval")]
    pub live_poll_interval_secs: u64,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            app_origin: None,
            remote_url: None,
            url_mode: UrlMode::default(),
            remote_username: None,
            remote_password: None,
            sync_enabled: true,
            reserved_store: default_reserved_store(),
            storage_quota_bytes: None,
            live_poll_interval_secs: default_poll_interval(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SCRIBE_DATA_DIR, SCRIBE_REMOTE_URL, ...)
    /// 2. Config file (~/.config/scribe/config.toml or SCRIBE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_APP_ORIGIN", ENV_PREFIX)) {
            self.app_origin = non_empty(val);
        }

        // Empty string clears the override
        if let Ok(val) = std::env::var(format!("{}_REMOTE_URL", ENV_PREFIX)) {
            self.remote_url = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_URL_MODE", ENV_PREFIX)) {
            if let Ok(mode) = val.parse() {
                self.url_mode = mode;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_REMOTE_USERNAME", ENV_PREFIX)) {
            self.remote_username = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_REMOTE_PASSWORD", ENV_PREFIX)) {
            self.remote_password = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SYNC_ENABLED", ENV_PREFIX)) {
            self.sync_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Ok(val) = std::env::var(format!("{}_STORAGE_QUOTA_BYTES", ENV_PREFIX)) {
            self.storage_quota_bytes = val.parse().ok();
        }

        if let Ok(val) = std::env::var(format!("{}_RESERVED_STORE", ENV_PREFIX)) {
            if !val.is_empty() {
                self.reserved_store = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_LIVE_POLL_INTERVAL_SECS", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.live_poll_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = non_empty(val).map(PathBuf::from);
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SCRIBE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scribe")
            .join("config.toml")
    }

    /// Remote credentials, present only when a username is configured
    pub fn credentials(&self) -> Option<Credentials> {
        self.remote_username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.remote_password.clone().unwrap_or_default(),
        })
    }

    /// Interval between remote polls while live sync is idle
    pub fn live_poll_interval(&self) -> Duration {
        Duration::from_secs(self.live_poll_interval_secs.max(1))
    }

    /// Path of the persisted sync log
    pub fn sync_log_path(&self) -> PathBuf {
        self.data_dir.join("sync_log.json")
    }
}

/// Static basic-auth credentials for the remote store
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scribe")
}

fn default_true() -> bool {
    true
}

fn default_reserved_store() -> String {
    STORE_PREFIX.to_string()
}

fn default_poll_interval() -> u64 {
    5
}
