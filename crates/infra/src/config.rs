//! Configuration loading and representation.
//!
//! Everything is read from the environment:
//!
//! | variable | default |
//! |----------|---------|
//! | `DATABASE_URL` | unset (required by `connect()`) |
//! | `DATABASE_MAX_CONNECTIONS` | 10 |
//! | `DATABASE_ACQUIRE_TIMEOUT_SECS` | 5 |
//! | `ACCOUNT_NUMBER_ATTEMPTS` | 32 |

use std::str::FromStr;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ACCOUNT_NUMBER_ATTEMPTS: u32 = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,

    #[error("failed to connect to Postgres: {0}")]
    Connect(#[source] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankConfig {
    /// Postgres URL. Required by `connect()`.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound on account-number draws per registration.
    pub account_number_attempts: u32,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            account_number_attempts: DEFAULT_ACCOUNT_NUMBER_ATTEMPTS,
        }
    }
}

impl BankConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_positive(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            acquire_timeout: Duration::from_secs(parse_positive(
                &lookup,
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout.as_secs(),
            )?),
            account_number_attempts: parse_positive(
                &lookup,
                "ACCOUNT_NUMBER_ATTEMPTS",
                defaults.account_number_attempts,
            )?,
        })
    }

    /// Connect a Postgres pool sized and bounded by this config.
    pub async fn connect(&self) -> Result<PgPool, ConfigError> {
        let url = self
            .database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(url)
            .await
            .map_err(ConfigError::Connect)
    }
}

fn parse_positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    let value = raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
