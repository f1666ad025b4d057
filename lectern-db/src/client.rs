//! Pooled database client.

use deadpool_postgres::{Object, Pool};
use lectern_core::RetryPolicy;
use lectern_storage::QueryExecutor;

use crate::config::DbConfig;
use crate::error::DbResult;

/// Connection pool plus the query executor every repository routes through.
///
/// Cloning is cheap: the pool is reference-counted and the executor is `Copy`.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
    executor: QueryExecutor,
}

impl DbClient {
    pub fn new(pool: Pool, policy: RetryPolicy) -> Self {
        Self {
            pool,
            executor: QueryExecutor::new(policy),
        }
    }

    /// Create a client from configuration. The pool connects lazily.
    pub fn from_config(config: &DbConfig) -> DbResult<Self> {
        let pool = config.create_pool()?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            max_size = config.max_size,
            max_attempts = config.retry.max_attempts(),
            "database pool configured"
        );
        Ok(Self::new(pool, config.retry))
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Check out a connection.
    ///
    /// Call this inside the retried operation so that a failed checkout is
    /// retried along with the query.
    pub async fn get_conn(&self) -> DbResult<Object> {
        Ok(self.pool.get().await?)
    }
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool", &self.pool.status())
            .field("executor", &self.executor)
            .finish()
    }
}
