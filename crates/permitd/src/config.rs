//! Broker configuration from environment variables.
//!
//! Command-line flags are applied on top by the executable.

use crate::permit::DEFAULT_TOTAL_PERMITS;
use crate::transport::ServerConfig;

pub const ENV_PERMITS: &str = "PERMITD_PERMITS";
pub const ENV_HOST: &str = "PERMITD_HOST";
pub const ENV_PORT: &str = "PERMITD_PORT";
pub const ENV_AWAIT_EXPLICIT_SHUTDOWN: &str = "PERMITD_AWAIT_EXPLICIT_SHUTDOWN";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Pool size. Zero or negative falls back to the default when the pool is built.
    pub total_permits: i64,
    pub server: ServerConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            total_permits: DEFAULT_TOTAL_PERMITS as i64,
            server: ServerConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_PERMITS) {
            config.total_permits = parse_permits(ENV_PERMITS, &v)?;
        }
        if let Some(v) = lookup(ENV_HOST) {
            config.server.host = v;
        }
        if let Some(v) = lookup(ENV_PORT) {
            config.server.port = parse_port(ENV_PORT, &v)?;
        }
        if let Some(v) = lookup(ENV_AWAIT_EXPLICIT_SHUTDOWN) {
            config.server.await_explicit_shutdown = parse_flag(ENV_AWAIT_EXPLICIT_SHUTDOWN, &v)?;
        }

        Ok(config)
    }
}

pub fn parse_permits(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| ConfigError::invalid(key, value, e.to_string()))
}

pub fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::invalid(key, value, e.to_string()))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}
