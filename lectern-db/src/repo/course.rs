use std::sync::Arc;

use chrono::Utc;
use lectern_core::{Course, CourseId, EntityIdType, EntityType, NewCourse, UserId};
use lectern_storage::{MemoryCache, QueryContext};
use tokio_postgres::Row;
use tracing::instrument;

use crate::client::DbClient;
use crate::error::{DbError, DbResult};

const COURSE_COLUMNS: &str =
    "course_id, title, description, instructor_id, published, created_at, updated_at";

/// Course metadata access, memoized in-process.
///
/// Reads are cache-first. Every successful write refreshes or drops the
/// cached entry, and a read only fills the cache if no write landed while it
/// was in flight, so a reader never sees a value older than the last write
/// made through this repository.
#[derive(Debug, Clone)]
pub struct CourseRepository {
    client: DbClient,
    cache: Arc<MemoryCache<Course>>,
}

impl CourseRepository {
    pub fn new(client: DbClient) -> Self {
        Self::with_cache(client, Arc::new(MemoryCache::new()))
    }

    /// Share a cache between several repository handles.
    pub fn with_cache(client: DbClient, cache: Arc<MemoryCache<Course>>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &MemoryCache<Course> {
        &self.cache
    }

    #[instrument(skip_all, fields(course_id = %id))]
    pub async fn get(&self, ctx: &QueryContext, id: CourseId) -> DbResult<Course> {
        let key = cache_key(id);
        if let Some(course) = self.cache.get(&key) {
            tracing::trace!("course cache hit");
            return Ok(course);
        }
        tracing::trace!("course cache miss");

        let stamp = self.cache.stamp();
        let course = self
            .client
            .executor()
            .exec_query(ctx, || self.fetch(id))
            .await?;
        if !self.cache.fill(key, course.clone(), stamp) {
            tracing::trace!("course changed during read, not cached");
        }
        Ok(course)
    }

    /// All published courses, newest first. Warms the cache with each row.
    #[instrument(skip_all)]
    pub async fn list_published(&self, ctx: &QueryContext) -> DbResult<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE published ORDER BY created_at DESC"
        );
        let stamp = self.cache.stamp();
        let courses = self
            .client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let rows = conn.query(sql.as_str(), &[]).await?;
                rows.iter().map(course_from_row).collect::<DbResult<Vec<_>>>()
            })
            .await?;

        for course in &courses {
            self.cache.fill(cache_key(course.course_id), course.clone(), stamp);
        }
        Ok(courses)
    }

    /// Insert a new course. The id and timestamps are fixed before the first
    /// attempt, and a conflicting id is ignored, so a retry cannot duplicate.
    #[instrument(skip_all, fields(title = %new.title))]
    pub async fn create(&self, ctx: &QueryContext, new: NewCourse) -> DbResult<Course> {
        let now = Utc::now();
        let course = Course {
            course_id: CourseId::now_v7(),
            title: new.title,
            description: new.description,
            instructor_id: new.instructor_id,
            published: new.published,
            created_at: now,
            updated_at: now,
        };

        let sql = format!(
            "INSERT INTO courses ({COURSE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (course_id) DO NOTHING"
        );
        self.client
            .executor()
            .exec_command(ctx, || async {
                let conn = self.client.get_conn().await?;
                let inserted = conn
                    .execute(
                        sql.as_str(),
                        &[
                            &course.course_id.as_uuid(),
                            &course.title,
                            &course.description,
                            &course.instructor_id.as_uuid(),
                            &course.published,
                            &course.created_at,
                            &course.updated_at,
                        ],
                    )
                    .await?;
                Ok::<_, DbError>(inserted)
            })
            .await?;

        tracing::debug!(course_id = %course.course_id, "course created");
        self.cache.set(cache_key(course.course_id), course.clone());
        Ok(course)
    }

    /// Overwrite a course's mutable fields and refresh its cache entry.
    #[instrument(skip_all, fields(course_id = %course.course_id))]
    pub async fn update(&self, ctx: &QueryContext, course: Course) -> DbResult<Course> {
        let updated = Course {
            updated_at: Utc::now(),
            ..course
        };

        let rows = self
            .client
            .executor()
            .exec_query(ctx, || async {
                let conn = self.client.get_conn().await?;
                let rows = conn
                    .execute(
                        "UPDATE courses SET title = $2, description = $3, published = $4, \
                         updated_at = $5 WHERE course_id = $1",
                        &[
                            &updated.course_id.as_uuid(),
                            &updated.title,
                            &updated.description,
                            &updated.published,
                            &updated.updated_at,
                        ],
                    )
                    .await?;
                Ok::<_, DbError>(rows)
            })
            .await?;

        let key = cache_key(updated.course_id);
        if rows == 0 {
            self.cache.remove(&key);
            return Err(DbError::not_found(EntityType::Course, updated.course_id));
        }

        self.cache.set(key, updated.clone());
        Ok(updated)
    }

    /// Delete a course. Deleting an absent course is not an error.
    #[instrument(skip_all, fields(course_id = %id))]
    pub async fn delete(&self, ctx: &QueryContext, id: CourseId) -> DbResult<()> {
        self.client
            .executor()
            .exec_command(ctx, || async {
                let conn = self.client.get_conn().await?;
                let rows = conn
                    .execute("DELETE FROM courses WHERE course_id = $1", &[&id.as_uuid()])
                    .await?;
                Ok::<_, DbError>(rows)
            })
            .await?;

        self.cache.remove(&cache_key(id));
        Ok(())
    }

    async fn fetch(&self, id: CourseId) -> DbResult<Course> {
        let conn = self.client.get_conn().await?;
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE course_id = $1");
        let row = conn
            .query_opt(sql.as_str(), &[&id.as_uuid()])
            .await?
            .ok_or_else(|| DbError::not_found(EntityType::Course, id))?;
        course_from_row(&row)
    }
}

fn cache_key(id: CourseId) -> String {
    format!("{}:{}", EntityType::Course.as_str(), id)
}

fn course_from_row(row: &Row) -> DbResult<Course> {
    Ok(Course {
        course_id: CourseId::new(row.try_get("course_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        instructor_id: UserId::new(row.try_get("instructor_id")?),
        published: row.try_get("published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
