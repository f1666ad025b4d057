//! Lectern Test Utilities
//!
//! Shared test infrastructure for the Lectern workspace:
//! - A fake driver error with a settable SQLSTATE
//! - A scripted operation that replays outcomes and counts invocations
//! - Proptest generators for entity types and SQLSTATE codes
//! - Fixtures and assertions for common scenarios

pub use lectern_core::{
    Course, CourseId, Enrollment, EnrollmentStatus, EntityIdType, EntityType, LessonId,
    LessonProgress, NewCourse, RetryPolicy, Timestamp, UserId,
};
pub use lectern_storage::{ContextError, DriverError, QueryContext, QueryExecutor};

use std::collections::VecDeque;
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// FAKE DRIVER
// ============================================================================

/// Driver error stand-in whose SQLSTATE is chosen by the test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FakeDriverError {
    #[error("driver error (SQLSTATE {0})")]
    Sql(String),

    #[error("no rows in result set")]
    NotFound,

    /// A failure the driver attached no code to (I/O, decoding).
    #[error("driver error: {0}")]
    Uncoded(String),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl FakeDriverError {
    pub fn sql(code: impl Into<String>) -> Self {
        FakeDriverError::Sql(code.into())
    }

    /// `08006` connection_failure
    pub fn connection_failure() -> Self {
        Self::sql("08006")
    }

    /// `40001` serialization_failure
    pub fn serialization_failure() -> Self {
        Self::sql("40001")
    }

    /// `40P01` deadlock_detected
    pub fn deadlock() -> Self {
        Self::sql("40P01")
    }

    /// `53300` too_many_connections
    pub fn too_many_connections() -> Self {
        Self::sql("53300")
    }

    /// `57P01` admin_shutdown
    pub fn admin_shutdown() -> Self {
        Self::sql("57P01")
    }

    /// `23505` unique_violation
    pub fn unique_violation() -> Self {
        Self::sql("23505")
    }

    /// `42601` syntax_error
    pub fn syntax_error() -> Self {
        Self::sql("42601")
    }
}

impl DriverError for FakeDriverError {
    fn sql_state(&self) -> Option<&str> {
        match self {
            FakeDriverError::Sql(code) => Some(code.as_str()),
            _ => None,
        }
    }

    fn is_not_found(&self) -> bool {
        matches!(self, FakeDriverError::NotFound)
    }
}

// ============================================================================
// SCRIPTED OPERATION
// ============================================================================

/// Replays a fixed list of outcomes, one per call, and counts the calls.
///
/// Once the script runs out, the last outcome repeats.
#[derive(Debug)]
pub struct ScriptedOperation<T, E> {
    script: Mutex<VecDeque<Result<T, E>>>,
    last: Mutex<Option<Result<T, E>>>,
    calls: AtomicU32,
}

impl<T: Clone, E: Clone> ScriptedOperation<T, E> {
    pub fn new(outcomes: impl IntoIterator<Item = Result<T, E>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail with each of `errors` in turn, then succeed with `value`.
    pub fn failing_then(errors: impl IntoIterator<Item = E>, value: T) -> Self {
        Self::new(errors.into_iter().map(Err).chain(std::iter::once(Ok(value))))
    }

    /// Fail with `error` on every call.
    pub fn always_failing(error: E) -> Self {
        Self::new([Err(error)])
    }

    /// Run the next step of the script.
    pub fn call(&self) -> Ready<Result<T, E>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => match last.as_ref() {
                Some(outcome) => outcome.clone(),
                None => panic!("ScriptedOperation called with an empty script"),
            },
        };
        ready(outcome)
    }

    /// How many times [`call`](Self::call) has run.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Lectern types.

    use super::*;
    use lectern_storage::TRANSIENT_SQLSTATE_CLASSES;
    use proptest::prelude::*;

    /// SQLSTATE classes that are never retried.
    pub const PERMANENT_SQLSTATE_CLASSES: [&str; 12] = [
        "00", "01", "02", "0A", "22", "23", "25", "28", "42", "44", "58", "XX",
    ];

    // === Identity Type Generators ===

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_course_id() -> impl Strategy<Value = CourseId> {
        arb_uuid().prop_map(CourseId::new)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::new)
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    // === Enum Generators ===

    pub fn arb_entity_type() -> impl Strategy<Value = EntityType> {
        prop_oneof![
            Just(EntityType::Course),
            Just(EntityType::Lesson),
            Just(EntityType::Enrollment),
            Just(EntityType::LessonProgress),
        ]
    }

    pub fn arb_enrollment_status() -> impl Strategy<Value = EnrollmentStatus> {
        prop_oneof![
            Just(EnrollmentStatus::Active),
            Just(EnrollmentStatus::Completed),
            Just(EnrollmentStatus::Withdrawn),
        ]
    }

    // === SQLSTATE Generators ===

    /// Any five-character SQLSTATE-shaped code.
    pub fn arb_sqlstate() -> impl Strategy<Value = String> {
        "[0-9A-Z]{5}"
    }

    /// A code whose class is on the transient allow-list.
    pub fn arb_transient_sqlstate() -> impl Strategy<Value = String> {
        (prop::sample::select(TRANSIENT_SQLSTATE_CLASSES.to_vec()), "[0-9A-Z]{3}")
            .prop_map(|(class, rest)| format!("{class}{rest}"))
    }

    /// A code whose class is never retried.
    pub fn arb_permanent_sqlstate() -> impl Strategy<Value = String> {
        (prop::sample::select(PERMANENT_SQLSTATE_CLASSES.to_vec()), "[0-9A-Z]{3}")
            .prop_map(|(class, rest)| format!("{class}{rest}"))
    }

    /// A driver error that should be retried.
    pub fn arb_transient_error() -> impl Strategy<Value = FakeDriverError> {
        arb_transient_sqlstate().prop_map(FakeDriverError::Sql)
    }

    /// A driver error that must fail fast.
    pub fn arb_permanent_error() -> impl Strategy<Value = FakeDriverError> {
        prop_oneof![
            arb_permanent_sqlstate().prop_map(FakeDriverError::Sql),
            Just(FakeDriverError::NotFound),
            "[a-z ]{1,20}".prop_map(FakeDriverError::Uncoded),
            Just(FakeDriverError::Context(ContextError::Cancelled)),
        ]
    }

    // === Configuration Generators ===

    /// A valid retry policy with small delays.
    pub fn arb_retry_policy() -> impl Strategy<Value = RetryPolicy> {
        (1u32..10, 1u64..500).prop_filter_map("valid policy", |(attempts, ms)| {
            RetryPolicy::new(attempts, Duration::from_millis(ms)).ok()
        })
    }

    // === Entity Generators ===

    pub fn arb_new_course() -> impl Strategy<Value = NewCourse> {
        (
            "[A-Za-z ]{1,60}",
            prop::option::of("[A-Za-z .,]{0,200}"),
            arb_user_id(),
            any::<bool>(),
        )
            .prop_map(|(title, description, instructor_id, published)| NewCourse {
                title,
                description,
                instructor_id,
                published,
            })
    }

    pub fn arb_course() -> impl Strategy<Value = Course> {
        (arb_course_id(), arb_new_course(), arb_timestamp()).prop_map(|(course_id, new, created_at)| {
            Course {
                course_id,
                title: new.title,
                description: new.description,
                instructor_id: new.instructor_id,
                published: new.published,
                created_at,
                updated_at: created_at,
            }
        })
    }

    pub fn arb_enrollment() -> impl Strategy<Value = Enrollment> {
        (arb_user_id(), arb_course_id(), arb_enrollment_status(), arb_timestamp()).prop_map(
            |(user_id, course_id, status, enrolled_at)| Enrollment {
                user_id,
                course_id,
                status,
                enrolled_at,
                updated_at: enrolled_at,
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for common scenarios.

    use super::*;

    /// Three attempts, 10ms base delay.
    pub fn fast_retry_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10)).unwrap_or_default()
    }

    pub fn fast_executor() -> QueryExecutor {
        QueryExecutor::new(fast_retry_policy())
    }

    pub fn published_course() -> Course {
        let now = Utc::now();
        Course {
            course_id: CourseId::now_v7(),
            title: "Ownership and Borrowing".to_string(),
            description: Some("Move semantics from first principles".to_string()),
            instructor_id: UserId::now_v7(),
            published: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn draft_course() -> Course {
        Course {
            title: "Async Rust (draft)".to_string(),
            description: None,
            published: false,
            ..published_course()
        }
    }

    pub fn new_course(instructor_id: UserId) -> NewCourse {
        NewCourse {
            title: "Error Handling".to_string(),
            description: Some("Result, ? and thiserror".to_string()),
            instructor_id,
            published: true,
        }
    }

    /// A context that is already cancelled.
    pub fn cancelled_context() -> QueryContext {
        let ctx = QueryContext::new();
        ctx.cancel();
        ctx
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on retry classification.

    use super::*;
    use lectern_storage::is_transient;

    /// Assert that an error would be retried.
    pub fn assert_transient<E: DriverError + std::fmt::Debug>(err: &E) {
        assert!(is_transient(err), "expected transient error, got {:?}", err);
    }

    /// Assert that an error fails fast.
    pub fn assert_permanent<E: DriverError + std::fmt::Debug>(err: &E) {
        assert!(!is_transient(err), "expected permanent error, got {:?}", err);
    }

    /// Assert that an operation ran exactly `expected` times.
    pub fn assert_calls<T: Clone, E: Clone>(op: &ScriptedOperation<T, E>, expected: u32) {
        assert_eq!(
            op.calls(),
            expected,
            "expected {} invocations, got {}",
            expected,
            op.calls()
        );
    }
}
