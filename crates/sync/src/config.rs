//! Runtime configuration, read once from `FLOORSYNC_*` environment variables
//! (an optional `.env` is loaded first) and passed by value from there on.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use floorsync_engine::QueuePolicy;
use thiserror::Error;

pub const ENV_SYNC_INTERVAL: &str = "FLOORSYNC_SYNC_INTERVAL_SECS";
pub const ENV_AUTOSAVE_INTERVAL: &str = "FLOORSYNC_AUTOSAVE_INTERVAL_SECS";
pub const ENV_MAX_RETRIES: &str = "FLOORSYNC_MAX_RETRIES";
pub const ENV_PROBE_INTERVAL: &str = "FLOORSYNC_PROBE_INTERVAL_SECS";
pub const ENV_API_BASE_URL: &str = "FLOORSYNC_API_BASE_URL";
pub const ENV_DATABASE_PATH: &str = "FLOORSYNC_DATABASE_PATH";
pub const ENV_REQUEST_TIMEOUT: &str = "FLOORSYNC_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub sync_interval: Duration,
    pub autosave_interval: Duration,
    pub max_retries: u32,
    pub probe_interval: Duration,
    pub api_base_url: Option<String>,
    pub database_path: PathBuf,
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(60),
            autosave_interval: Duration::from_secs(30),
            max_retries: floorsync_engine::queue::DEFAULT_MAX_RETRIES,
            probe_interval: Duration::from_secs(15),
            api_base_url: None,
            database_path: PathBuf::from("floorsync.db"),
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = parse_nonzero::<u64>(&lookup, ENV_SYNC_INTERVAL)? {
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_nonzero::<u64>(&lookup, ENV_AUTOSAVE_INTERVAL)? {
            config.autosave_interval = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_nonzero::<u32>(&lookup, ENV_MAX_RETRIES)? {
            config.max_retries = retries;
        }
        if let Some(secs) = parse_nonzero::<u64>(&lookup, ENV_PROBE_INTERVAL)? {
            config.probe_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_nonzero::<u64>(&lookup, ENV_REQUEST_TIMEOUT)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = non_empty(&lookup, ENV_API_BASE_URL) {
            config.api_base_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(path) = non_empty(&lookup, ENV_DATABASE_PATH) {
            config.database_path = PathBuf::from(path);
        }
        Ok(config)
    }

    pub fn require_api_base_url(&self) -> Result<&str, ConfigError> {
        self.api_base_url
            .as_deref()
            .ok_or(ConfigError::Missing(ENV_API_BASE_URL))
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        QueuePolicy {
            max_retries: self.max_retries,
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Zero intervals would spin the timers, so zero is rejected like garbage.
fn parse_nonzero<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr + Default + PartialEq,
{
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(None);
    };
    match raw.parse::<T>() {
        Ok(value) if value != T::default() => Ok(Some(value)),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}
