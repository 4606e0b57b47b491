use std::str::FromStr;
use std::time::Duration;

use genrun_core::log_buffer::DEFAULT_LOG_CAPACITY;
use genrun_remote::channel::ChannelConfig;
use genrun_remote::reconnect::{ReconnectConfig, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
use genrun_simulator::SpeedMultiplier;

use crate::store::DEFAULT_HISTORY_LIMIT;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Progress WebSocket endpoint.
    pub ws_url: String,
    /// Base URL of the generator REST API.
    pub api_url: String,
    pub reconnect: ReconnectConfig,
    pub speed: SpeedMultiplier,
    pub log_capacity: usize,
    pub history_limit: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

impl SyncConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default                           |
    /// |--------------------------|-----------------------------------|
    /// | `GENRUN_WS_URL`          | `ws://localhost:8000/ws/progress` |
    /// | `GENRUN_API_URL`         | `http://localhost:8000`           |
    /// | `RECONNECT_BASE_DELAY_MS`| `1000`                            |
    /// | `RECONNECT_MAX_RETRIES`  | `5`                               |
    /// | `SIMULATION_SPEED`       | `1` (1, 5 or 10)                  |
    /// | `LOG_CAPACITY`           | `100`                             |
    /// | `HISTORY_LIMIT`          | `20`                              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ws_url = lookup("GENRUN_WS_URL")
            .unwrap_or_else(|| "ws://localhost:8000/ws/progress".into());
        let api_url = lookup("GENRUN_API_URL").unwrap_or_else(|| "http://localhost:8000".into());

        let base_delay_ms: u64 = parse_or(
            &lookup,
            "RECONNECT_BASE_DELAY_MS",
            DEFAULT_BASE_DELAY.as_millis() as u64,
        )?;
        let max_retries: u32 = parse_or(&lookup, "RECONNECT_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;

        let speed_factor: u32 = parse_or(&lookup, "SIMULATION_SPEED", 1)?;
        let speed =
            SpeedMultiplier::try_from(speed_factor).map_err(|_| ConfigError::Invalid {
                name: "SIMULATION_SPEED",
                value: speed_factor.to_string(),
            })?;

        let log_capacity = parse_or(&lookup, "LOG_CAPACITY", DEFAULT_LOG_CAPACITY)?;
        let history_limit = parse_or(&lookup, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;

        Ok(Self {
            ws_url,
            api_url,
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(base_delay_ms),
                max_retries,
            },
            speed,
            log_capacity,
            history_limit,
        })
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.ws_url.clone(),
            reconnect: self.reconnect,
        }
    }
}

/// Parse `name` if set, otherwise return `default`.
pub fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Read a required variable.
pub fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name).ok_or(ConfigError::Missing(name))
}
