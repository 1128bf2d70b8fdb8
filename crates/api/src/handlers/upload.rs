//! Multipart upload admission.
//!
//! Accepts 1..N `files` parts plus JSON-encoded `options` (global) and
//! `perFileOptions` (keyed by filename). Validation failures reject the
//! offending file only; a request where every file failed returns 400.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use gifpress_core::gifsicle::{self, GifInfo};
use gifpress_core::options::CompressionOptions;
use gifpress_db::models::job::{JobPatch, JobStatus, NewJob};
use gifpress_db::repositories::JobRepo;
use gifpress_events::JobStatusPayload;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The only MIME type gifsicle can work on.
const ACCEPTED_MIME: &str = "image/gif";

/// Multipart field names.
const FIELD_FILES: &str = "files";
const FIELD_OPTIONS: &str = "options";
const FIELD_PER_FILE_OPTIONS: &str = "perFileOptions";
const FIELD_SESSION_ID: &str = "sessionId";

#[derive(Debug, Serialize)]
pub struct UploadedJob {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct UploadFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub jobs: Vec<UploadedJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<UploadFailure>>,
}

struct IncomingFile {
    filename: String,
    bytes: Bytes,
}

/// POST /api/upload
///
/// Admits files into the pipeline: create record, write artifact, probe,
/// enqueue. Returns 201 with the created jobs (plus per-file errors), or
/// 400 when every file failed.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let mut global_options = CompressionOptions::default();
    let mut per_file_options: HashMap<String, CompressionOptions> = HashMap::new();
    let mut session_id: Option<String> = None;
    let mut files: Vec<IncomingFile> = Vec::new();
    let mut failures: Vec<UploadFailure> = Vec::new();

    // Collect every part first; field order on the wire is not guaranteed.
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some(FIELD_OPTIONS) => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                global_options = serde_json::from_str(&raw)
                    .map_err(|e| AppError::BadRequest(format!("Invalid options JSON: {e}")))?;
            }
            Some(FIELD_PER_FILE_OPTIONS) => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                per_file_options = serde_json::from_str(&raw).map_err(|e| {
                    AppError::BadRequest(format!("Invalid perFileOptions JSON: {e}"))
                })?;
            }
            Some(FIELD_SESSION_ID) => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let trimmed = raw.trim().to_string();
                if !trimmed.is_empty() {
                    session_id = Some(trimmed);
                }
            }
            Some(FIELD_FILES) => {
                let filename = field
                    .file_name()
                    .unwrap_or("upload.gif")
                    .to_string();
                let content_type = field.content_type().map(str::to_string);

                if content_type.as_deref() != Some(ACCEPTED_MIME) {
                    failures.push(UploadFailure {
                        filename,
                        error: format!(
                            "Unsupported content type {:?}, expected {ACCEPTED_MIME}",
                            content_type.as_deref().unwrap_or("none"),
                        ),
                    });
                    continue;
                }

                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Upload truncated: {e}")))?;

                if bytes.len() > state.config.max_upload_bytes {
                    failures.push(UploadFailure {
                        filename,
                        error: format!(
                            "File exceeds the maximum upload size of {} bytes",
                            state.config.max_upload_bytes,
                        ),
                    });
                    continue;
                }
                if bytes.is_empty() {
                    failures.push(UploadFailure {
                        filename,
                        error: "Empty file".to_string(),
                    });
                    continue;
                }

                files.push(IncomingFile { filename, bytes });
            }
            _ => {}
        }
    }

    if files.is_empty() && failures.is_empty() {
        return Err(AppError::BadRequest("No files in upload".to_string()));
    }

    let mut jobs: Vec<UploadedJob> = Vec::new();
    for file in files {
        match admit_file(&state, &file, &global_options, &per_file_options, &session_id).await {
            Ok(job) => jobs.push(job),
            Err(error) => {
                tracing::warn!(filename = %file.filename, error = %error, "Upload rejected");
                failures.push(UploadFailure {
                    filename: file.filename,
                    error,
                });
            }
        }
    }

    let status = if jobs.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(UploadResponse {
            jobs,
            errors: if failures.is_empty() {
                None
            } else {
                Some(failures)
            },
        }),
    ))
}

/// Admit one file: record, artifact, probe, enqueue. An `Err` carries the
/// per-file error message and leaves no side effects behind.
async fn admit_file(
    state: &AppState,
    file: &IncomingFile,
    global_options: &CompressionOptions,
    per_file_options: &HashMap<String, CompressionOptions>,
    session_id: &Option<String>,
) -> Result<UploadedJob, String> {
    let options = per_file_options
        .get(&file.filename)
        .cloned()
        .unwrap_or_else(|| global_options.clone());
    options.validate().map_err(|e| e.to_string())?;

    let job_id = uuid::Uuid::new_v4().to_string();
    let new_job = NewJob {
        id: job_id.clone(),
        session_id: session_id.clone(),
        original_filename: file.filename.clone(),
        options,
        created_at: Utc::now(),
    };
    JobRepo::create(&state.pool, &new_job)
        .await
        .map_err(|e| format!("Failed to create job record: {e}"))?;

    let path = state.store.original_path(&job_id, &file.filename);
    if let Err(e) = state.store.write(&path, &file.bytes).await {
        let _ = JobRepo::delete(&state.pool, &job_id).await;
        return Err(format!("Failed to store upload: {e}"));
    }

    // Dimensions are best-effort at admission; the worker re-probes anyway.
    let info = match gifsicle::probe(&state.config.gifsicle_path, &path).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Probe failed at admission");
            GifInfo {
                width: 0,
                height: 0,
                frames: 1,
                size_bytes: file.bytes.len() as u64,
            }
        }
    };

    let patch = JobPatch {
        status: Some(JobStatus::Queued),
        progress: Some(0),
        original_size: Some(file.bytes.len() as i64),
        original_path: Some(path.to_string_lossy().into_owned()),
        original_width: (info.width > 0).then_some(info.width as i64),
        original_height: (info.height > 0).then_some(info.height as i64),
        ..Default::default()
    };
    JobRepo::update(&state.pool, &job_id, &patch)
        .await
        .map_err(|e| format!("Failed to update job record: {e}"))?;

    state.event_bus.publish_job(
        &job_id,
        JobStatusPayload {
            status: JobStatus::Queued.as_str().to_string(),
            progress: 0,
            ..Default::default()
        },
    );
    state.worker_pool.submit(job_id.clone());

    tracing::info!(
        job_id = %job_id,
        filename = %file.filename,
        size = file.bytes.len(),
        "Job admitted",
    );

    Ok(UploadedJob {
        id: job_id,
        filename: file.filename.clone(),
    })
}
