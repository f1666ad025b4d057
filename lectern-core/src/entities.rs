//! Core entity structures

use crate::{CourseId, EnrollmentStatus, LessonId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Course - the unit a learner enrolls in.
/// Course metadata is read far more often than it is written, which is why
/// repositories memoize it in-process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub instructor_id: UserId,
    pub published: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Payload for creating a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub instructor_id: UserId,
    pub published: bool,
}

/// A learner's enrollment in a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub enrolled_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Completion record for one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub completed_at: Timestamp,
}
