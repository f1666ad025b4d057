//! Lectern Storage - Resilient Data Access
//!
//! Every repository call against the durable store goes through this crate:
//!
//! - [`QueryExecutor`] applies the process-wide [`RetryPolicy`] to each
//!   operation (`exec_query` for value-returning calls, `exec_command` for
//!   side-effect-only calls).
//! - [`retry_with_backoff`] is the generic retry loop behind it: bounded
//!   attempts, exponential backoff, cooperative cancellation through a
//!   [`QueryContext`].
//! - [`is_transient`] decides which driver errors are worth retrying, based on
//!   the SQLSTATE class reported through the [`DriverError`] capability.
//! - [`MemoryCache`] memoizes read-heavy entities in-process.
//!
//! Retried operations run again from scratch, so only read-only or idempotent
//! operations should be routed through the retrying entry points.

pub mod cache;
pub mod context;
pub mod query;
pub mod retry;

pub use cache::{CacheStamp, CacheStats, MemoryCache};
pub use context::{ContextError, QueryContext};
pub use lectern_core::RetryPolicy;
pub use query::QueryExecutor;
pub use retry::{
    classify, is_transient, retry_with_backoff, sqlstate_class, Classifier, DriverError,
    ErrorClass, TransientClass, TRANSIENT_SQLSTATE_CLASSES,
};
