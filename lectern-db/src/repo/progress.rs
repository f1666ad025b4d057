use chrono::Utc;
use lectern_core::{CourseId, LessonId, LessonProgress, UserId};
use lectern_storage::QueryContext;
use tokio_postgres::Row;
use tracing::instrument;

use crate::client::DbClient;
use crate::error::DbResult;

const PROGRESS_COLUMNS: &str = "user_id, course_id, lesson_id, completed_at";

/// Lesson completion tracking.
#[derive(Debug, Clone)]
pub struct ProgressRepository {
    client: DbClient,
}

impl ProgressRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    /// Record that `user` finished `lesson`. Completing a lesson twice keeps
    /// the first completion time.
    #[instrument(skip_all, fields(user_id = %user, lesson_id = %lesson))]
    pub async fn mark_lesson_complete(
        &self,
        ctx: &QueryContext,
        user: UserId,
        course: CourseId,
        lesson: LessonId,
    ) -> DbResult<LessonProgress> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO lesson_progress ({PROGRESS_COLUMNS}) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, lesson_id) \
             DO UPDATE SET completed_at = lesson_progress.completed_at \
             RETURNING {PROGRESS_COLUMNS}"
        );

        self.client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let row = conn
                    .query_one(
                        sql.as_str(),
                        &[&user.as_uuid(), &course.as_uuid(), &lesson.as_uuid(), &now],
                    )
                    .await?;
                progress_from_row(&row)
            })
            .await
    }

    /// Lessons of `course` completed by `user`, in completion order.
    #[instrument(skip_all, fields(user_id = %user, course_id = %course))]
    pub async fn completed_lessons(
        &self,
        ctx: &QueryContext,
        user: UserId,
        course: CourseId,
    ) -> DbResult<Vec<LessonProgress>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM lesson_progress \
             WHERE user_id = $1 AND course_id = $2 ORDER BY completed_at"
        );

        self.client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let rows = conn
                    .query(sql.as_str(), &[&user.as_uuid(), &course.as_uuid()])
                    .await?;
                rows.iter().map(progress_from_row).collect::<DbResult<Vec<_>>>()
            })
            .await
    }
}

fn progress_from_row(row: &Row) -> DbResult<LessonProgress> {
    Ok(LessonProgress {
        user_id: UserId::new(row.try_get("user_id")?),
        course_id: CourseId::new(row.try_get("course_id")?),
        lesson_id: LessonId::new(row.try_get("lesson_id")?),
        completed_at: row.try_get("completed_at")?,
    })
}
