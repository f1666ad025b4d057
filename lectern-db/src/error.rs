//! Repository error type.

use deadpool_postgres::{CreatePoolError, PoolError};
use lectern_core::{ConfigError, EntityType};
use lectern_storage::{ContextError, DriverError};
use thiserror::Error;

/// Errors surfaced by the PostgreSQL repositories.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityType, id: String },

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to create connection pool: {0}")]
    CreatePool(#[from] CreatePoolError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("failed to decode {entity} row: {reason}")]
    Decode { entity: EntityType, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for repository operations.
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn not_found(entity: EntityType, id: impl ToString) -> Self {
        DbError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn decode(entity: EntityType, reason: impl ToString) -> Self {
        DbError::Decode {
            entity,
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// Whether the caller's context was cancelled or ran out of time.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DbError::Context(_))
    }

    /// The underlying driver error, if any.
    fn postgres(&self) -> Option<&tokio_postgres::Error> {
        match self {
            DbError::Postgres(err) => Some(err),
            DbError::Pool(PoolError::Backend(err)) => Some(err),
            _ => None,
        }
    }
}

impl DriverError for DbError {
    fn sql_state(&self) -> Option<&str> {
        self.postgres()
            .and_then(|err| err.code())
            .map(|state| state.code())
    }

    fn is_not_found(&self) -> bool {
        DbError::is_not_found(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_storage::is_transient;
    use lectern_test_utils::generators::arb_entity_type;
    use proptest::prelude::*;

    #[test]
    fn test_not_found_display() {
        let err = DbError::not_found(EntityType::Course, "0190a1b2");
        assert_eq!(err.to_string(), "course not found: 0190a1b2");
        assert!(err.is_not_found());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_decode_display() {
        let err = DbError::decode(EntityType::Enrollment, "unknown status 'paused'");
        assert_eq!(
            err.to_string(),
            "failed to decode enrollment row: unknown status 'paused'"
        );
    }

    #[test]
    fn test_context_errors_convert() {
        let err: DbError = ContextError::DeadlineExceeded.into();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "deadline exceeded");
    }

    #[test]
    fn test_errors_without_sqlstate_are_not_retried() {
        let errors = [
            DbError::not_found(EntityType::Course, "x"),
            DbError::decode(EntityType::LessonProgress, "bad column"),
            DbError::Context(ContextError::Cancelled),
            DbError::Config(ConfigError::InvalidValue {
                field: "LECTERN_DB_PORT".to_string(),
                value: "abc".to_string(),
                reason: "not a number".to_string(),
            }),
        ];
        for err in &errors {
            assert_eq!(err.sql_state(), None);
            assert!(!is_transient(err), "{err} should be permanent");
        }
    }

    #[test]
    fn test_pool_closed_is_not_retried() {
        let err = DbError::Pool(PoolError::Closed);
        assert_eq!(err.sql_state(), None);
        assert!(!is_transient(&err));
    }

    proptest! {
        #[test]
        fn prop_not_found_names_entity_and_fails_fast(
            entity in arb_entity_type(),
            id in "[0-9a-f]{8}",
        ) {
            let err = DbError::not_found(entity, &id);
            prop_assert_eq!(err.to_string(), format!("{} not found: {id}", entity.as_str()));
            prop_assert!(err.is_not_found());
            prop_assert!(!is_transient(&err));
        }
    }
}
