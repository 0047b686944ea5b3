use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::local_db::LocalStore;
use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

pub const ENV_API_URL: &str = "STUDYSYNC_API_URL";
pub const ENV_API_KEY: &str = "STUDYSYNC_API_KEY";
pub const ENV_TIMEOUT_MS: &str = "STUDYSYNC_TIMEOUT_MS";
pub const ENV_SYNC_INTERVAL_SECS: &str = "STUDYSYNC_SYNC_INTERVAL_SECS";
pub const ENV_DB_PATH: &str = "STUDYSYNC_DB_PATH";

/// Application configuration wrapper.
///
/// Layers, lowest first: defaults, optional TOML file, environment.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
}

impl Config {
    /// Load configuration from an optional file plus the environment
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match file {
            Some(path) => AppConfig::from_toml_file(path)?,
            None => AppConfig::default(),
        };
        Self::with_env(base, |key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` on top of `base`
    pub fn with_env(base: AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = AppConfigBuilder::from_config(base);

        if let Some(url) = lookup(ENV_API_URL) {
            builder = builder.api_base_url(url);
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            builder = builder.api_key(key);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            builder = builder.request_timeout(Duration::from_millis(parse_number(ENV_TIMEOUT_MS, &raw)?));
        }
        if let Some(raw) = lookup(ENV_SYNC_INTERVAL_SECS) {
            builder = builder.sync_interval(Duration::from_secs(parse_number(ENV_SYNC_INTERVAL_SECS, &raw)?));
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            builder = builder.database_path(path);
        }

        Ok(Self { app: builder.build()? })
    }

    pub fn from_app(app: AppConfig) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Configured database file, or the platform default
    pub fn database_path(&self) -> PathBuf {
        self.app
            .database_path
            .clone()
            .unwrap_or_else(LocalStore::default_path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_app(AppConfig::default())
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        message: format!("expected a whole number, got '{}'", raw),
    })
}
