use chrono::Utc;
use lectern_core::{CourseId, Enrollment, EnrollmentStatus, EntityType, UserId};
use lectern_storage::QueryContext;
use tokio_postgres::Row;
use tracing::instrument;

use crate::client::DbClient;
use crate::error::{DbError, DbResult};

const ENROLLMENT_COLUMNS: &str = "user_id, course_id, status, enrolled_at, updated_at";

/// Learner enrollments. Not cached: enrollment state changes often and is
/// read per user.
#[derive(Debug, Clone)]
pub struct EnrollmentRepository {
    client: DbClient,
}

impl EnrollmentRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    /// Enroll a user, or return the existing enrollment unchanged.
    #[instrument(skip_all, fields(user_id = %user, course_id = %course))]
    pub async fn enroll(
        &self,
        ctx: &QueryContext,
        user: UserId,
        course: CourseId,
    ) -> DbResult<Enrollment> {
        let now = Utc::now();
        let status = EnrollmentStatus::Active.as_db_str();
        // The no-op update makes RETURNING yield the existing row on conflict.
        let sql = format!(
            "INSERT INTO enrollments ({ENROLLMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT (user_id, course_id) DO UPDATE SET updated_at = enrollments.updated_at \
             RETURNING {ENROLLMENT_COLUMNS}"
        );

        self.client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let row = conn
                    .query_one(
                        sql.as_str(),
                        &[&user.as_uuid(), &course.as_uuid(), &status, &now],
                    )
                    .await?;
                enrollment_from_row(&row)
            })
            .await
    }

    #[instrument(skip_all, fields(user_id = %user, course_id = %course))]
    pub async fn get(
        &self,
        ctx: &QueryContext,
        user: UserId,
        course: CourseId,
    ) -> DbResult<Enrollment> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 AND course_id = $2"
        );

        self.client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let row = conn
                    .query_opt(sql.as_str(), &[&user.as_uuid(), &course.as_uuid()])
                    .await?
                    .ok_or_else(|| not_found(user, course))?;
                enrollment_from_row(&row)
            })
            .await
    }

    /// Every enrollment of a user, most recent first.
    #[instrument(skip_all, fields(user_id = %user))]
    pub async fn list_for_user(&self, ctx: &QueryContext, user: UserId) -> DbResult<Vec<Enrollment>> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 \
             ORDER BY enrolled_at DESC"
        );

        self.client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let rows = conn.query(sql.as_str(), &[&user.as_uuid()]).await?;
                rows.iter().map(enrollment_from_row).collect::<DbResult<Vec<_>>>()
            })
            .await
    }

    /// Move an enrollment to `status`. Setting the same status twice is harmless.
    #[instrument(skip_all, fields(user_id = %user, course_id = %course, status = %status))]
    pub async fn set_status(
        &self,
        ctx: &QueryContext,
        user: UserId,
        course: CourseId,
        status: EnrollmentStatus,
    ) -> DbResult<Enrollment> {
        let now = Utc::now();
        let status = status.as_db_str();
        let sql = format!(
            "UPDATE enrollments SET status = $3, updated_at = $4 \
             WHERE user_id = $1 AND course_id = $2 RETURNING {ENROLLMENT_COLUMNS}"
        );

        self.client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let row = conn
                    .query_opt(
                        sql.as_str(),
                        &[&user.as_uuid(), &course.as_uuid(), &status, &now],
                    )
                    .await?
                    .ok_or_else(|| not_found(user, course))?;
                enrollment_from_row(&row)
            })
            .await
    }
}

fn not_found(user: UserId, course: CourseId) -> DbError {
    DbError::not_found(EntityType::Enrollment, format!("{user}/{course}"))
}

fn enrollment_from_row(row: &Row) -> DbResult<Enrollment> {
    let status: String = row.try_get("status")?;
    let status = EnrollmentStatus::from_db_str(&status)
        .map_err(|e| DbError::decode(EntityType::Enrollment, e))?;

    Ok(Enrollment {
        user_id: UserId::new(row.try_get("user_id")?),
        course_id: CourseId::new(row.try_get("course_id")?),
        status,
        enrolled_at: row.try_get("enrolled_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
