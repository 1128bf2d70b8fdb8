//! Repository for the `jobs` table.
//!
//! Uses the `JobStatus` enum for all status transitions. Listing and partial
//! updates build their SQL dynamically; everything else is a fixed statement
//! with `RETURNING` where the caller needs the updated row.

use sqlx::types::Json;
use sqlx::QueryBuilder;

use gifpress_core::types::Timestamp;

use crate::models::job::{
    CompletedArtifact, Job, JobCounts, JobFilter, JobPatch, JobStatus, NewJob,
};
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, session_id, status, progress, \
    original_filename, original_size, original_path, original_width, original_height, \
    options, \
    compressed_path, compressed_size, compressed_width, compressed_height, \
    reduction_percent, error_message, \
    created_at, started_at, completed_at, expires_at";

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 20;

/// Error message recorded for jobs found mid-flight after a restart.
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

/// Provides CRUD operations and lifecycle transitions for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `uploading` status. A duplicate id fails.
    pub async fn create(pool: &DbPool, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, session_id, status, original_filename, options, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.id)
            .bind(&input.session_id)
            .bind(JobStatus::Uploading)
            .bind(&input.original_filename)
            .bind(Json(&input.options))
            .bind(input.created_at)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its id.
    pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Apply a partial update, returning the updated row.
    ///
    /// A no-op (absent id or empty patch) returns the current row, if any.
    pub async fn update(
        pool: &DbPool,
        id: &str,
        patch: &JobPatch,
    ) -> Result<Option<Job>, sqlx::Error> {
        if patch.is_empty() {
            return Self::find_by_id(pool, id).await;
        }

        let mut qb = QueryBuilder::new("UPDATE jobs SET ");
        let mut set = qb.separated(", ");
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status);
        }
        if let Some(progress) = patch.progress {
            set.push("progress = ").push_bind_unseparated(progress);
        }
        if let Some(size) = patch.original_size {
            set.push("original_size = ").push_bind_unseparated(size);
        }
        if let Some(path) = &patch.original_path {
            set.push("original_path = ").push_bind_unseparated(path.clone());
        }
        if let Some(width) = patch.original_width {
            set.push("original_width = ").push_bind_unseparated(width);
        }
        if let Some(height) = patch.original_height {
            set.push("original_height = ").push_bind_unseparated(height);
        }
        if let Some(started_at) = patch.started_at {
            set.push("started_at = ").push_bind_unseparated(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            set.push("completed_at = ").push_bind_unseparated(completed_at);
        }
        if let Some(expires_at) = patch.expires_at {
            set.push("expires_at = ").push_bind_unseparated(expires_at);
        }
        if let Some(message) = &patch.error_message {
            set.push("error_message = ").push_bind_unseparated(message.clone());
        }

        qb.push(" WHERE id = ").push_bind(id.to_string());
        qb.push(format!(" RETURNING {COLUMNS}"));

        qb.build_query_as::<Job>().fetch_optional(pool).await
    }

    /// Delete a job record. Returns whether a row was removed.
    pub async fn delete(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List jobs matching the filter, newest first, plus the unpaged total.
    pub async fn list(pool: &DbPool, filter: &JobFilter) -> Result<(Vec<Job>, i64), sqlx::Error> {
        let limit = if filter.limit > 0 {
            filter.limit.min(MAX_LIMIT)
        } else {
            DEFAULT_LIMIT
        };
        let offset = filter.offset.max(0);

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM jobs");
        Self::push_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM jobs"));
        Self::push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let jobs = qb.build_query_as::<Job>().fetch_all(pool).await?;
        Ok((jobs, total))
    }

    /// Append the shared WHERE clause for [`list`](Self::list).
    fn push_filters(qb: &mut QueryBuilder<'_, sqlx::Sqlite>, filter: &JobFilter) {
        let mut prefix = " WHERE ";

        if !filter.statuses.is_empty() {
            qb.push(prefix).push("status IN (");
            let mut values = qb.separated(", ");
            for status in &filter.statuses {
                values.push_bind(*status);
            }
            qb.push(")");
            prefix = " AND ";
        }
        if let Some(session_id) = &filter.session_id {
            qb.push(prefix)
                .push("session_id = ")
                .push_bind(session_id.clone());
            prefix = " AND ";
        }
        if let Some(filename) = &filter.filename {
            qb.push(prefix)
                .push("original_filename LIKE ")
                .push_bind(format!("%{filename}%"));
            prefix = " AND ";
        }
        if let Some(after) = filter.created_after {
            qb.push(prefix).push("created_at >= ").push_bind(after);
            prefix = " AND ";
        }
        if let Some(before) = filter.created_before {
            qb.push(prefix).push("created_at <= ").push_bind(before);
        }
    }

    /// Count jobs per status in a single pass.
    pub async fn counts(pool: &DbPool) -> Result<JobCounts, sqlx::Error> {
        sqlx::query_as::<_, JobCounts>(
            "SELECT \
                 COUNT(*) AS \"all\", \
                 COALESCE(SUM(status = 'uploading'), 0)  AS uploading, \
                 COALESCE(SUM(status = 'queued'), 0)     AS queued, \
                 COALESCE(SUM(status = 'processing'), 0) AS processing, \
                 COALESCE(SUM(status = 'completed'), 0)  AS completed, \
                 COALESCE(SUM(status = 'failed'), 0)     AS failed \
             FROM jobs",
        )
        .fetch_one(pool)
        .await
    }

    /// Jobs whose retention has lapsed.
    pub async fn expired(pool: &DbPool, now: Timestamp) -> Result<Vec<Job>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM jobs WHERE expires_at IS NOT NULL AND expires_at < ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Lifecycle transitions
    // -----------------------------------------------------------------------

    /// Move a queued job into `processing`.
    pub async fn mark_processing(
        pool: &DbPool,
        id: &str,
        started_at: Timestamp,
        progress: i64,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET status = ?, started_at = ?, progress = ? \
             WHERE id = ? AND status = ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Processing)
            .bind(started_at)
            .bind(progress)
            .bind(id)
            .bind(JobStatus::Queued)
            .fetch_optional(pool)
            .await
    }

    /// Record an animator tick. Guarded so late ticks never move progress
    /// backwards or touch a job that already left `processing`.
    pub async fn update_progress(
        pool: &DbPool,
        id: &str,
        progress: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = ? \
             WHERE id = ? AND status = 'processing' AND progress <= ?",
        )
        .bind(progress)
        .bind(id)
        .bind(progress)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job completed with its compressed artifact facts.
    pub async fn complete(
        pool: &DbPool,
        id: &str,
        artifact: &CompletedArtifact,
        completed_at: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET \
                 status = ?, progress = 100, error_message = NULL, \
                 compressed_path = ?, compressed_size = ?, \
                 compressed_width = ?, compressed_height = ?, \
                 reduction_percent = ?, completed_at = ?, expires_at = ? \
             WHERE id = ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Completed)
            .bind(&artifact.path)
            .bind(artifact.size)
            .bind(artifact.width)
            .bind(artifact.height)
            .bind(artifact.reduction_percent)
            .bind(completed_at)
            .bind(expires_at)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark a job failed. Progress resets to 0 and compressed fields clear.
    pub async fn fail(
        pool: &DbPool,
        id: &str,
        message: &str,
        completed_at: Timestamp,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET \
                 status = ?, progress = 0, error_message = ?, completed_at = ?, \
                 compressed_path = NULL, compressed_size = NULL, \
                 compressed_width = NULL, compressed_height = NULL, \
                 reduction_percent = NULL \
             WHERE id = ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Failed)
            .bind(message)
            .bind(completed_at)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Reset a failed job for re-enqueueing. Options, original file facts,
    /// and `created_at` are preserved; lifecycle fields clear.
    ///
    /// Returns `None` when the job does not exist or is not `failed`.
    pub async fn reset_for_retry(pool: &DbPool, id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET \
                 status = ?, progress = 0, error_message = NULL, \
                 started_at = NULL, completed_at = NULL, expires_at = NULL, \
                 compressed_path = NULL, compressed_size = NULL, \
                 compressed_width = NULL, compressed_height = NULL, \
                 reduction_percent = NULL \
             WHERE id = ? AND status = ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued)
            .bind(id)
            .bind(JobStatus::Failed)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Startup reconciliation
    // -----------------------------------------------------------------------

    /// Fail every job left in `processing` by a previous process. Returns
    /// how many rows were converted.
    pub async fn fail_interrupted(
        pool: &DbPool,
        completed_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET \
                 status = ?, progress = 0, error_message = ?, completed_at = ?, \
                 compressed_path = NULL, compressed_size = NULL, \
                 compressed_width = NULL, compressed_height = NULL, \
                 reduction_percent = NULL \
             WHERE status = ?",
        )
        .bind(JobStatus::Failed)
        .bind(INTERRUPTED_MESSAGE)
        .bind(completed_at)
        .bind(JobStatus::Processing)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Ids of jobs still `queued`, oldest first, for startup re-enqueueing.
    pub async fn queued_ids(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM jobs WHERE status = ? ORDER BY created_at ASC")
            .bind(JobStatus::Queued)
            .fetch_all(pool)
            .await
    }
}
