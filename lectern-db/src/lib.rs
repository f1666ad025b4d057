//! Lectern DB - PostgreSQL Repositories
//!
//! The PostgreSQL side of the data-access layer:
//! - [`DbConfig`] / [`DbClient`]: connection pool built from `LECTERN_DB_*`
//!   environment variables.
//! - [`DbError`]: the repository error type. It reports SQLSTATE codes through
//!   [`lectern_storage::DriverError`], which is all the retry classifier needs.
//! - [`CourseRepository`], [`EnrollmentRepository`], [`ProgressRepository`]:
//!   every driver call goes through the client's [`lectern_storage::QueryExecutor`].
//! - [`telemetry`]: tracing subscriber setup for binaries embedding the layer.

pub mod client;
pub mod config;
pub mod error;
pub mod repo;
pub mod telemetry;

pub use client::DbClient;
pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use repo::{CourseRepository, EnrollmentRepository, ProgressRepository};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
