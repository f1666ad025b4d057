//! Lectern Core - Entity Types
//!
//! Pure data structures shared by the storage and database crates:
//! typed identifiers, course/enrollment/progress entities, error enums and
//! the retry policy configuration. No I/O lives here.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use config::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
pub use entities::{Course, Enrollment, LessonProgress, NewCourse};
pub use enums::{EnrollmentStatus, EntityType};
pub use error::{ConfigError, ValidationError};
pub use identity::{CourseId, EntityId, EntityIdType, LessonId, Timestamp, UserId};
