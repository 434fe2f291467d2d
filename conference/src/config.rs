//! Configuration management for the conference service.
//!
//! Loads configuration from environment variables (and a `.env` file, if
//! present) with sensible defaults. A variable that is set but cannot be
//! parsed is an error rather than silently replaced by its default.

use conference_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set to an unparsable value
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name
        name: &'static str,
        /// Value found
        value: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Transaction retry configuration
    pub retry: RetryConfig,
    /// Announcement refresher configuration
    pub announcement: AnnouncementConfig,
    /// Prometheus exporter configuration
    pub metrics: MetricsConfig,
    /// Log filter directive (`RUST_LOG`)
    pub log_filter: String,
}

/// Retry configuration for contended transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3)
    pub max_retries: usize,
    /// Delay before the first retry in milliseconds (default: 10)
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 200)
    pub max_delay_ms: u64,
}

/// Announcement configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementConfig {
    /// Seconds between recomputations (default: 60)
    pub refresh_secs: u64,
    /// Announce conferences with at most this many seats (default: 5)
    pub seat_threshold: i64,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Start the Prometheus exporter (default: false)
    pub enabled: bool,
    /// Listen host (default: 127.0.0.1)
    pub host: String,
    /// Listen port (default: 9090)
    pub port: u16,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Reads `.env` first if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a variable that is set but
    /// unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a variable that is set but
    /// unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        Ok(Self {
            retry: RetryConfig {
                max_retries: vars.parse("RETRY_MAX_RETRIES", 3)?,
                initial_delay_ms: vars.parse("RETRY_INITIAL_DELAY_MS", 10)?,
                max_delay_ms: vars.parse("RETRY_MAX_DELAY_MS", 200)?,
            },
            announcement: AnnouncementConfig {
                refresh_secs: vars.parse("ANNOUNCEMENT_REFRESH_SECS", 60)?,
                seat_threshold: vars.parse("ANNOUNCEMENT_SEAT_THRESHOLD", 5)?,
            },
            metrics: MetricsConfig {
                enabled: vars.parse("METRICS_ENABLED", false)?,
                host: vars.string("METRICS_HOST", "127.0.0.1"),
                port: vars.parse("METRICS_PORT", 9090)?,
            },
            log_filter: vars.string("RUST_LOG", "conference=info"),
        })
    }

    /// Retry policy for contended transactions.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.retry.max_retries)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .build()
    }

    /// Period of the announcement refresher.
    #[must_use]
    pub const fn announcement_period(&self) -> Duration {
        Duration::from_secs(self.announcement.refresh_secs)
    }

    /// Address for the metrics exporter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the host is not an IP address.
    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.metrics.host, self.metrics.port);
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            name: "METRICS_HOST",
            value: self.metrics.host.clone(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 3,
                initial_delay_ms: 10,
                max_delay_ms: 200,
            },
            announcement: AnnouncementConfig {
                refresh_secs: 60,
                seat_threshold: 5,
            },
            metrics: MetricsConfig {
                enabled: false,
                host: "127.0.0.1".to_string(),
                port: 9090,
            },
            log_filter: "conference=info".to_string(),
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str, default: &str) -> String {
        (self.0)(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match (self.0)(name) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value }),
        }
    }
}
