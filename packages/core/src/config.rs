//! Runtime engine configuration
//!
//! `EngineConfig` collects the few knobs the engine and its SQL backend need.
//! It is built from defaults, optionally overridden by `MOVETREE_*`
//! environment variables, and never persisted.

use std::path::PathBuf;
use thiserror::Error;

/// Default SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Default number of retries `SiblingOperationQueue` attempts after the first try
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default capacity of the tree event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 128;

pub const ENV_DB_PATH: &str = "MOVETREE_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "MOVETREE_BUSY_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "MOVETREE_MAX_RETRIES";
pub const ENV_EVENT_CAPACITY: &str = "MOVETREE_EVENT_CAPACITY";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path of the libsql database file
    pub database_path: PathBuf,

    /// How long a connection waits for a competing writer before reporting busy
    pub busy_timeout_ms: u64,

    /// Retry budget for transient store conflicts
    pub max_retries: u32,

    /// Capacity of the tree event channel (must be at least 1)
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/movetree.db"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Build a config from defaults overridden by `MOVETREE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from defaults overridden by whatever `lookup` returns
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = parse_number(ENV_BUSY_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_EVENT_CAPACITY) {
            let capacity: usize = parse_number(ENV_EVENT_CAPACITY, &value)?;
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    var: ENV_EVENT_CAPACITY,
                    value,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.event_capacity = capacity;
        }

        Ok(config)
    }
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
