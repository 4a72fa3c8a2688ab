//! Client configuration loaded from RON.
//!
//! Lookup order: explicit path, then `$XDG_CONFIG_HOME/balancer/client.ron`,
//! then built-in defaults from [`constants`](crate::constants). Environment
//! variables override whatever the file says:
//!
//! | Variable           | Field     |
//! |--------------------|-----------|
//! | `BALANCER_API_URL` | `api_url` |
//! | `BALANCER_WS_URL`  | `ws_url`  |
//! | `BALANCER_TOKEN`   | `token`   |
//!
//! ```ron
//! (
//!     api_url: "https://balancer.example.com/api",
//!     ws_url: "wss://balancer.example.com/realtime",
//!     page_size: 50,
//! )
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{
    DATABASE_SUMMARY_REVALIDATE, DEFAULT_API_URL, DEFAULT_PAGE_SIZE, DEFAULT_WS_URL,
    DIALOG_EXIT_DELAY, POLL_INTERVAL,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub ws_url: String,
    pub page_size: usize,
    pub poll_interval_ms: u64,
    pub dialog_exit_delay_ms: u64,
    pub database_summary_revalidate_secs: u64,
    /// Bearer credential. Usually supplied through `BALANCER_TOKEN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
            dialog_exit_delay_ms: DIALOG_EXIT_DELAY.as_millis() as u64,
            database_summary_revalidate_secs: DATABASE_SUMMARY_REVALIDATE.as_secs(),
            token: None,
        }
    }
}

impl ClientConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("balancer").join("client.ron"))
    }

    /// Load config, apply environment overrides, validate.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            },
        };
        let config = config.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_ron(&text)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Apply `BALANCER_*` overrides using `lookup` to read variables.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("BALANCER_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("BALANCER_WS_URL") {
            self.ws_url = url;
        }
        if let Some(token) = lookup("BALANCER_TOKEN").filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be at least 1".into()));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!("api_url is not http(s): {}", self.api_url)));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dialog_exit_delay(&self) -> Duration {
        Duration::from_millis(self.dialog_exit_delay_ms)
    }

    pub fn database_summary_revalidate(&self) -> Duration {
        Duration::from_secs(self.database_summary_revalidate_secs)
    }
}
