//! Job entity model and DTOs for the compression pipeline.

use gifpress_core::options::CompressionOptions;
use gifpress_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of a compression job.
///
/// Transitions: `uploading → queued → processing → {completed, failed}`,
/// plus `failed → queued` via retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Uploading,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploading => "uploading",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a wire value (query parameter, bucket key).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploading" => Some(JobStatus::Uploading),
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A row from the `jobs` table. The record is the authority for job state;
/// in-memory worker state is a transient reflection of it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: String,
    pub session_id: Option<String>,
    pub status: JobStatus,
    pub progress: i64,
    pub original_filename: String,
    pub original_size: i64,
    pub original_path: Option<String>,
    pub original_width: Option<i64>,
    pub original_height: Option<i64>,
    /// Frozen at admission; retry resets lifecycle fields but never this.
    #[sqlx(json)]
    pub options: CompressionOptions,
    pub compressed_path: Option<String>,
    pub compressed_size: Option<i64>,
    pub compressed_width: Option<i64>,
    pub compressed_height: Option<i64>,
    pub reduction_percent: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

/// Input for creating a job record at admission.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub session_id: Option<String>,
    pub original_filename: String,
    pub options: CompressionOptions,
    pub created_at: Timestamp,
}

/// Partial update applied to a job row. Fields left as `None` are untouched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<i64>,
    pub original_size: Option<i64>,
    pub original_path: Option<String>,
    pub original_width: Option<i64>,
    pub original_height: Option<i64>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub error_message: Option<String>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.original_size.is_none()
            && self.original_path.is_none()
            && self.original_width.is_none()
            && self.original_height.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
            && self.expires_at.is_none()
            && self.error_message.is_none()
    }
}

/// Compressed artifact facts recorded on successful completion.
#[derive(Debug, Clone)]
pub struct CompletedArtifact {
    pub path: String,
    pub size: i64,
    pub width: i64,
    pub height: i64,
    pub reduction_percent: f64,
}

/// Filters for the job listing query.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Empty means all statuses.
    pub statuses: Vec<JobStatus>,
    pub session_id: Option<String>,
    /// Substring match on the original filename.
    pub filename: Option<String>,
    pub created_after: Option<Timestamp>,
    pub created_before: Option<Timestamp>,
    pub limit: i64,
    pub offset: i64,
}

/// Per-status job counts for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize)]
pub struct JobCounts {
    pub all: i64,
    pub uploading: i64,
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}
