//! Repositories over [`DbClient`](crate::DbClient).
//!
//! Each repository method wraps its driver calls in a single closure handed
//! to the client's [`QueryExecutor`](lectern_storage::QueryExecutor), so the
//! connection checkout and the statement are retried together. Writes are
//! phrased as upserts or keyed updates with values fixed before the first
//! attempt, which keeps a retried write harmless.

mod course;
mod enrollment;
mod progress;

pub use course::CourseRepository;
pub use enrollment::EnrollmentRepository;
pub use progress::ProgressRepository;
