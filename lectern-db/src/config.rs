//! Connection pool configuration.

use std::str::FromStr;
use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use lectern_core::{ConfigError, RetryPolicy};
use tokio_postgres::NoTls;

use crate::error::DbResult;

/// Database connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
    /// Retry policy applied to every store operation
    pub retry: RetryPolicy,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "lectern".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl DbConfig {
    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LECTERN_DB_HOST` (default: localhost)
    /// - `LECTERN_DB_PORT` (default: 5432)
    /// - `LECTERN_DB_NAME` (default: lectern)
    /// - `LECTERN_DB_USER` (default: postgres)
    /// - `LECTERN_DB_PASSWORD` (default: empty)
    /// - `LECTERN_DB_POOL_SIZE` (default: 16)
    /// - `LECTERN_DB_TIMEOUT`: seconds (default: 30)
    /// - `LECTERN_DB_RETRY_MAX_ATTEMPTS`, `LECTERN_DB_RETRY_BASE_DELAY_MS`: see
    ///   [`RetryPolicy::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_size = parse_or("LECTERN_DB_POOL_SIZE", &lookup, defaults.max_size)?;
        if max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "LECTERN_DB_POOL_SIZE".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: lookup("LECTERN_DB_HOST").unwrap_or(defaults.host),
            port: parse_or("LECTERN_DB_PORT", &lookup, defaults.port)?,
            dbname: lookup("LECTERN_DB_NAME").unwrap_or(defaults.dbname),
            user: lookup("LECTERN_DB_USER").unwrap_or(defaults.user),
            password: lookup("LECTERN_DB_PASSWORD").unwrap_or(defaults.password),
            max_size,
            timeout: Duration::from_secs(parse_or(
                "LECTERN_DB_TIMEOUT",
                &lookup,
                defaults.timeout.as_secs(),
            )?),
            retry: RetryPolicy::from_lookup(&lookup)?,
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> DbResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(pool)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw,
            reason: "not a valid number".to_string(),
        }),
        None => Ok(default),
    }
}
