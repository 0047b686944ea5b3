//! Application configuration module
//!
//! `AppConfig` is assembled through `AppConfigBuilder`, optionally seeded from
//! a TOML file. Environment overrides live in `client::config`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default companion backend
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default interval between periodic full sync cycles
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default number of delivery attempts before a queue item is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Companion backend base URL
    pub api_base_url: String,
    /// Optional API key sent as `X-API-Key`
    pub api_key: Option<String>,
    /// Timeout applied to every HTTP call
    pub request_timeout: Duration,
    /// Interval of the periodic background sync
    pub sync_interval: Duration,
    /// Delivery attempts per queue item before it is dropped
    pub max_retries: u32,
    /// SQLite file backing the local store (`None` = platform data dir)
    pub database_path: Option<PathBuf>,
    /// Start a sync cycle as soon as a mutation is enqueued while online
    pub sync_on_enqueue: bool,
    /// bcrypt cost for locally stored credential records
    pub local_password_cost: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            database_path: None,
            sync_on_enqueue: true,
            local_password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.api_base_url.clone()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "sync_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retries",
                message: "must allow at least one attempt".to_string(),
            });
        }
        if !(4..=31).contains(&self.local_password_cost) {
            return Err(ConfigError::InvalidValue {
                field: "local_password_cost",
                message: "bcrypt cost must be between 4 and 31".to_string(),
            });
        }
        Ok(())
    }

    /// Parse a TOML document into a builder-validated config
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.into_builder(AppConfig::builder()).build()
    }

    /// Read and parse a TOML config file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }
}

/// On-disk shape of the config file; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_base_url: Option<String>,
    api_key: Option<String>,
    request_timeout_ms: Option<u64>,
    sync_interval_secs: Option<u64>,
    max_retries: Option<u32>,
    database_path: Option<PathBuf>,
    sync_on_enqueue: Option<bool>,
    local_password_cost: Option<u32>,
}

impl FileConfig {
    fn into_builder(self, mut builder: AppConfigBuilder) -> AppConfigBuilder {
        if let Some(url) = self.api_base_url {
            builder = builder.api_base_url(url);
        }
        if let Some(key) = self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(ms) = self.request_timeout_ms {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        if let Some(secs) = self.sync_interval_secs {
            builder = builder.sync_interval(Duration::from_secs(secs));
        }
        if let Some(retries) = self.max_retries {
            builder = builder.max_retries(retries);
        }
        if let Some(path) = self.database_path {
            builder = builder.database_path(path);
        }
        if let Some(enabled) = self.sync_on_enqueue {
            builder = builder.sync_on_enqueue(enabled);
        }
        if let Some(cost) = self.local_password_cost {
            builder = builder.local_password_cost(cost);
        }
        builder
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    api_base_url: Option<String>,
    api_key: Option<String>,
    request_timeout: Option<Duration>,
    sync_interval: Option<Duration>,
    max_retries: Option<u32>,
    database_path: Option<PathBuf>,
    sync_on_enqueue: Option<bool>,
    local_password_cost: Option<u32>,
}

impl AppConfigBuilder {
    /// Start from an existing config (used to layer env overrides on a file)
    pub fn from_config(config: AppConfig) -> Self {
        Self {
            api_base_url: Some(config.api_base_url),
            api_key: config.api_key,
            request_timeout: Some(config.request_timeout),
            sync_interval: Some(config.sync_interval),
            max_retries: Some(config.max_retries),
            database_path: config.database_path,
            sync_on_enqueue: Some(config.sync_on_enqueue),
            local_password_cost: Some(config.local_password_cost),
        }
    }

    /// Set the companion backend URL
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn sync_on_enqueue(mut self, enabled: bool) -> Self {
        self.sync_on_enqueue = Some(enabled);
        self
    }

    pub fn local_password_cost(mut self, cost: u32) -> Self {
        self.local_password_cost = Some(cost);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            api_base_url: self
                .api_base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            api_key: self.api_key.filter(|key| !key.is_empty()),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            sync_interval: self.sync_interval.unwrap_or(defaults.sync_interval),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            database_path: self.database_path,
            sync_on_enqueue: self.sync_on_enqueue.unwrap_or(defaults.sync_on_enqueue),
            local_password_cost: self.local_password_cost.unwrap_or(defaults.local_password_cost),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("could not read config file {0}")]
    Io(String),
    #[error("could not parse config file: {0}")]
    Parse(String),
}
