//! Enum types shared across Lectern crates

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type discriminator used in errors and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Course,
    Lesson,
    Enrollment,
    LessonProgress,
}

impl EntityType {
    /// Short lowercase name, used as cache key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Course => "course",
            EntityType::Lesson => "lesson",
            EntityType::Enrollment => "enrollment",
            EntityType::LessonProgress => "lesson_progress",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENROLLMENT STATUS
// ============================================================================

/// Lifecycle state of a learner's enrollment in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Withdrawn,
}

impl EnrollmentStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Withdrawn => "withdrawn",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        match s.to_lowercase().as_str() {
            "active" => Ok(EnrollmentStatus::Active),
            "completed" => Ok(EnrollmentStatus::Completed),
            "withdrawn" => Ok(EnrollmentStatus::Withdrawn),
            _ => Err(ValidationError::InvalidValue {
                field: "enrollment_status".to_string(),
                reason: format!("unknown status '{}'", s),
            }),
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}
