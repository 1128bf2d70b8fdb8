//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use gifpress_core::types::Timestamp;
use gifpress_db::models::job::{Job, JobCounts, JobFilter, JobStatus};
use gifpress_db::repositories::job_repo::{DEFAULT_LIMIT, MAX_LIMIT};
use gifpress_db::repositories::JobRepo;
use gifpress_events::JobStatusPayload;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    /// Single status, comma-separated list, or `all`.
    pub status: Option<String>,
    pub session_id: Option<String>,
    /// Substring match on the original filename.
    pub filename: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for `GET /api/jobs`.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job or 404.
async fn find_job(pool: &gifpress_db::DbPool, id: &str) -> AppResult<Job> {
    JobRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Job", id))
}

/// Parse the `status` query parameter into a filter list.
fn parse_statuses(raw: &Option<String>) -> AppResult<Vec<JobStatus>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        return Ok(Vec::new());
    }

    trimmed
        .split(',')
        .map(|part| {
            let part = part.trim();
            JobStatus::parse(part)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown status '{part}'")))
        })
        .collect()
}

/// Parse a date boundary: RFC 3339, or a bare date pinned to the start or
/// end of that day.
fn parse_date(raw: &str, end_of_day: bool) -> AppResult<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(naive) = time {
            return Ok(naive.and_utc());
        }
    }
    Err(AppError::BadRequest(format!("Invalid date '{raw}'")))
}

// ---------------------------------------------------------------------------
// List / counts / get
// ---------------------------------------------------------------------------

/// GET /api/jobs
///
/// List jobs newest-first with filtering and pagination. `total` is the
/// unpaged count under the same filters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsQuery>,
) -> AppResult<Json<JobListResponse>> {
    let filter = JobFilter {
        statuses: parse_statuses(&params.status)?,
        session_id: params.session_id.clone(),
        filename: params.filename.clone(),
        created_after: params
            .start_date
            .as_deref()
            .map(|raw| parse_date(raw, false))
            .transpose()?,
        created_before: params
            .end_date
            .as_deref()
            .map(|raw| parse_date(raw, true))
            .transpose()?,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset: params.offset.unwrap_or(0).max(0),
    };

    let (jobs, total) = JobRepo::list(&state.pool, &filter).await?;

    Ok(Json(JobListResponse {
        jobs,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// GET /api/jobs/counts
pub async fn job_counts(State(state): State<AppState>) -> AppResult<Json<JobCounts>> {
    Ok(Json(JobRepo::counts(&state.pool).await?))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<Job>> {
    Ok(Json(find_job(&state.pool, &job_id).await?))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/jobs/{id}
///
/// Removes the record and both artifacts. Honored in every state: the
/// client-side session GC relies on deleting `uploading`/`queued` strays,
/// and the UI (not the server) is what prevents deleting a processing job.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let job = find_job(&state.pool, &job_id).await?;

    for path in [&job.original_path, &job.compressed_path] {
        if let Some(path) = path {
            if let Err(e) = state.store.remove(path).await {
                tracing::warn!(job_id = %job_id, path, error = %e, "Failed to remove artifact");
            }
        }
    }

    if !JobRepo::delete(&state.pool, &job_id).await? {
        return Err(AppError::not_found("Job", job_id));
    }

    tracing::info!(job_id = %job_id, "Job deleted");
    Ok(Json(json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// POST /api/jobs/{id}/retry
///
/// Re-enqueue a failed job. Lifecycle fields reset in place; options,
/// original file facts, and `created_at` are preserved. This is the ONLY
/// retry path; nothing retries automatically.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<Job>> {
    let job = find_job(&state.pool, &job_id).await?;
    if job.status != JobStatus::Failed {
        return Err(AppError::BadRequest(
            "Only failed jobs can be retried".to_string(),
        ));
    }

    let retried = JobRepo::reset_for_retry(&state.pool, &job_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(gifpress_core::error::CoreError::Conflict(
                "Job left the failed state before the retry applied".to_string(),
            ))
        })?;

    state.event_bus.publish_job(
        &job_id,
        JobStatusPayload {
            status: JobStatus::Queued.as_str().to_string(),
            progress: 0,
            ..Default::default()
        },
    );
    state.worker_pool.submit(job_id.clone());

    tracing::info!(job_id = %job_id, "Job retried");
    Ok(Json(retried))
}
