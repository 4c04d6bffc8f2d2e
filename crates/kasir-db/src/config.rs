//! Application configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                          | Default      |
//! |-----------------------------------|--------------|
//! | `KASIR_DB_PATH`                   | `./kasir.db` |
//! | `KASIR_DB_MAX_CONNECTIONS`        | `5`          |
//! | `KASIR_DB_BUSY_TIMEOUT_MS`        | `5000`       |
//! | `KASIR_CHECKOUT_MAX_RETRIES`      | `3`          |
//! | `KASIR_CHECKOUT_RETRY_BACKOFF_MS` | `25`         |
//! | `KASIR_CHECKOUT_TIMEOUT_MS`       | `10000`      |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::checkout::CheckoutConfig;
use crate::pool::DbConfig;

/// Default database file when `KASIR_DB_PATH` is unset.
pub const DEFAULT_DB_PATH: &str = "./kasir.db";

/// Everything needed to open the store and run checkouts.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DbConfig,
    pub checkout: CheckoutConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unset keys take their defaults; set but unparsable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("KASIR_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        if path.trim().is_empty() {
            return Err(ConfigError::MissingRequired("KASIR_DB_PATH".to_string()));
        }

        let defaults = DbConfig::new(&path);
        let checkout_defaults = CheckoutConfig::default();

        let max_connections: u32 =
            parse_or(&lookup, "KASIR_DB_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "KASIR_DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        let database = defaults
            .clone()
            .max_connections(max_connections)
            .min_connections(defaults.min_connections.min(max_connections))
            .busy_timeout(millis_or(
                &lookup,
                "KASIR_DB_BUSY_TIMEOUT_MS",
                defaults.busy_timeout,
            )?);

        let timeout = millis_or(&lookup, "KASIR_CHECKOUT_TIMEOUT_MS", checkout_defaults.timeout)?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "KASIR_CHECKOUT_TIMEOUT_MS".to_string(),
            ));
        }

        let checkout = checkout_defaults
            .clone()
            .max_retries(parse_or(
                &lookup,
                "KASIR_CHECKOUT_MAX_RETRIES",
                checkout_defaults.max_retries,
            )?)
            .retry_backoff(millis_or(
                &lookup,
                "KASIR_CHECKOUT_RETRY_BACKOFF_MS",
                checkout_defaults.retry_backoff,
            )?)
            .timeout(timeout);

        Ok(AppConfig { database, checkout })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
