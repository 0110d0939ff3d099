//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString to keep
//! credentials out of logs.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Queue name used when `TASKSTORE_QUEUE` is not set.
pub const DEFAULT_QUEUE: &str = "default";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub queue_name: String,
    pub pool: PoolSettings,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            max_connections: parsed_var("DB_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections),
            acquire_timeout_secs: parsed_var("DB_ACQUIRE_TIMEOUT_SECS")?
                .unwrap_or(defaults.acquire_timeout_secs),
        }
        .validate()?;
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            queue_name: std::env::var("TASKSTORE_QUEUE").unwrap_or_else(|_| DEFAULT_QUEUE.into()),
            pool,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Connection pool sizing and timeouts.
///
/// Can be read from a TOML file:
///
/// ```toml
/// max_connections = 20
/// acquire_timeout_secs = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// How long an operation waits for a free connection before failing.
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Reject settings the pool cannot be built with.
    pub fn validate(self) -> Result<Self> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".into()));
        }
        Ok(self)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid pool settings: {e}")))?;
        settings.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}
