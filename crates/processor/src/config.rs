//! Service configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use domain::RetryPolicy;
use event_buffer::WatcherConfig;
use thiserror::Error;

/// A variable was set to something that does not parse.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{key}={value:?} is invalid: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got {other}")),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL connection string (default: unset, in-memory backends)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `EVENT_BUFFER_POLL_INTERVAL_SECS`: watcher interval (default: `30`)
/// - `EVENT_BUFFER_MAX_ATTEMPTS`: park rows after this many failed ticks
///   (default: unset, retry forever)
/// - `COMMAND_MAX_ATTEMPTS`: attempts per command on version conflicts (default: `5`)
/// - `COMMAND_INITIAL_BACKOFF_MS` / `COMMAND_MAX_BACKOFF_MS`: retry backoff
///   (default: `50` / `2000`)
/// - `METRICS_ADDR`: Prometheus listener (default: `"0.0.0.0:9000"`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub poll_interval: Duration,
    pub buffer_max_attempts: Option<u32>,
    pub command_max_attempts: u32,
    pub command_initial_backoff: Duration,
    pub command_max_backoff: Duration,
    pub metrics_addr: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the value of a
    /// variable or None if it is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let poll_interval_secs: u64 = parse_or(
            "EVENT_BUFFER_POLL_INTERVAL_SECS",
            get("EVENT_BUFFER_POLL_INTERVAL_SECS"),
            defaults.poll_interval.as_secs(),
        )?;
        if poll_interval_secs == 0 {
            return Err(ConfigError {
                key: "EVENT_BUFFER_POLL_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                get("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
            )?,
            poll_interval: Duration::from_secs(poll_interval_secs),
            buffer_max_attempts: get("EVENT_BUFFER_MAX_ATTEMPTS")
                .map(|v| parse("EVENT_BUFFER_MAX_ATTEMPTS", v))
                .transpose()?,
            command_max_attempts: parse_or(
                "COMMAND_MAX_ATTEMPTS",
                get("COMMAND_MAX_ATTEMPTS"),
                defaults.command_max_attempts,
            )?,
            command_initial_backoff: Duration::from_millis(parse_or(
                "COMMAND_INITIAL_BACKOFF_MS",
                get("COMMAND_INITIAL_BACKOFF_MS"),
                defaults.command_initial_backoff.as_millis() as u64,
            )?),
            command_max_backoff: Duration::from_millis(parse_or(
                "COMMAND_MAX_BACKOFF_MS",
                get("COMMAND_MAX_BACKOFF_MS"),
                defaults.command_max_backoff.as_millis() as u64,
            )?),
            metrics_addr: parse_or("METRICS_ADDR", get("METRICS_ADDR"), defaults.metrics_addr)?,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or("LOG_FORMAT", get("LOG_FORMAT"), defaults.log_format)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.command_max_attempts,
            self.command_initial_backoff,
            self.command_max_backoff,
        )
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: self.poll_interval,
            max_attempts: self.buffer_max_attempts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            poll_interval: Duration::from_secs(30),
            buffer_max_attempts: None,
            command_max_attempts: 5,
            command_initial_backoff: Duration::from_millis(50),
            command_max_backoff: Duration::from_millis(2000),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        key,
        reason: e.to_string(),
        value,
    })
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| parse(key, v))
}
