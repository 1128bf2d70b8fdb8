//! Artifact download handlers: single-file streaming and bulk ZIP export.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use gifpress_db::models::job::{Job, JobStatus};
use gifpress_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Deflate level for bulk archives: a middle ground between speed and size
/// for already-compressed GIF payloads.
const ZIP_COMPRESSION_LEVEL: i64 = 5;

/// Suffix appended to compressed download filenames.
const COMPRESSED_SUFFIX: &str = "-compressed";

#[derive(Debug, Deserialize)]
pub struct ZipArchiveQuery {
    /// Comma-separated job ids.
    pub ids: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_job(pool: &gifpress_db::DbPool, id: &str) -> AppResult<Job> {
    JobRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Job", id))
}

/// Strip characters that would break a `Content-Disposition` header.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' | '\r' | '\n' | '/' => '_',
            c => c,
        })
        .collect()
}

/// The client-facing name for a compressed artifact:
/// `<basename>-compressed.<ext>`.
fn compressed_filename(original_filename: &str) -> String {
    let path = FsPath::new(original_filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("download");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("gif");
    sanitize_filename(&format!("{stem}{COMPRESSED_SUFFIX}.{ext}"))
}

/// Stream a file from disk. A missing file surfaces as 404: the artifact
/// may have been reaped after the record was read.
async fn stream_file(
    state: &AppState,
    job_id: &str,
    path: &str,
    filename: &str,
    inline: bool,
) -> AppResult<Response> {
    let (file, len) = state
        .store
        .open(path)
        .await
        .map_err(|_| AppError::not_found("Artifact", job_id))?;

    let disposition = if inline {
        format!("inline; filename=\"{filename}\"")
    } else {
        format!("attachment; filename=\"{filename}\"")
    };

    let stream = ReaderStream::new(file);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/gif")
        .header(header::CONTENT_LENGTH, len.to_string())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// Single downloads
// ---------------------------------------------------------------------------

/// GET /api/download/{id}
///
/// Streams the compressed artifact as an attachment.
pub async fn download_compressed(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let job = find_job(&state.pool, &job_id).await?;
    let path = job
        .compressed_path
        .as_deref()
        .ok_or_else(|| AppError::not_found("Artifact", &job_id))?;

    let filename = compressed_filename(&job.original_filename);
    stream_file(&state, &job_id, path, &filename, false).await
}

/// GET /api/download/{id}/original
///
/// Streams the original upload inline.
pub async fn download_original(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let job = find_job(&state.pool, &job_id).await?;
    let path = job
        .original_path
        .as_deref()
        .ok_or_else(|| AppError::not_found("Artifact", &job_id))?;

    let filename = sanitize_filename(&job.original_filename);
    stream_file(&state, &job_id, path, &filename, true).await
}

// ---------------------------------------------------------------------------
// Bulk ZIP
// ---------------------------------------------------------------------------

/// GET /api/download/zip/archive?ids=a,b,c
///
/// Bundles the completed artifacts among the requested ids into a single
/// ZIP. Duplicate archive names are disambiguated with `-1`, `-2`, ….
pub async fn zip_archive(
    State(state): State<AppState>,
    Query(query): Query<ZipArchiveQuery>,
) -> AppResult<Response> {
    let ids: Vec<&str> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(AppError::BadRequest("No job ids given".to_string()));
    }

    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();
    for id in ids {
        let Some(job) = JobRepo::find_by_id(&state.pool, id).await? else {
            continue;
        };
        if job.status != JobStatus::Completed {
            continue;
        }
        let Some(path) = job.compressed_path else {
            continue;
        };
        let name = unique_entry_name(&mut taken, &compressed_filename(&job.original_filename));
        entries.push((name, PathBuf::from(path)));
    }

    if entries.is_empty() {
        return Err(AppError::not_found("CompletedArtifacts", query.ids));
    }

    let bytes = tokio::task::spawn_blocking(move || build_zip(&entries))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(format!("Failed to build archive: {e}")))?;

    let archive_name = format!("compressed-gifs-{}.zip", Utc::now().format("%Y-%m-%d"));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, bytes.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{archive_name}\""),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Claim a unique archive entry name, inserting `-1`, `-2`, … before the
/// extension on collision.
fn unique_entry_name(taken: &mut HashSet<String>, base: &str) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (base, None),
    };
    for n in 1.. {
        let candidate = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("candidate loop always terminates");
}

/// Assemble the archive in memory. Artifacts that vanished since the record
/// was read (reaper race) are skipped.
fn build_zip(entries: &[(String, PathBuf)]) -> std::io::Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(ZIP_COMPRESSION_LEVEL));

    for (name, path) in entries {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Artifact vanished while zipping, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };
        writer.start_file(name.as_str(), options).map_err(to_io_error)?;
        writer.write_all(&data)?;
    }

    let cursor = writer.finish().map_err(to_io_error)?;
    Ok(cursor.into_inner())
}

fn to_io_error(e: zip::result::ZipError) -> std::io::Error {
    std::io::Error::other(e)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_filename_inserts_suffix() {
        assert_eq!(compressed_filename("dance.gif"), "dance-compressed.gif");
        assert_eq!(compressed_filename("no-extension"), "no-extension-compressed.gif");
    }

    #[test]
    fn compressed_filename_sanitizes() {
        assert_eq!(
            compressed_filename("we\"ird.gif"),
            "we_ird-compressed.gif"
        );
    }

    #[test]
    fn duplicate_entry_names_are_disambiguated() {
        let mut taken = HashSet::new();
        assert_eq!(unique_entry_name(&mut taken, "x-compressed.gif"), "x-compressed.gif");
        assert_eq!(unique_entry_name(&mut taken, "x-compressed.gif"), "x-compressed-1.gif");
        assert_eq!(unique_entry_name(&mut taken, "x-compressed.gif"), "x-compressed-2.gif");
        assert_eq!(unique_entry_name(&mut taken, "other.gif"), "other.gif");
    }

    #[test]
    fn zip_round_trip_contains_entries() {
        let dir = std::env::temp_dir().join(format!("gifpress-zip-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.gif");
        let b = dir.join("b.gif");
        std::fs::write(&a, b"GIF89a-one").unwrap();
        std::fs::write(&b, b"GIF89a-two").unwrap();

        let entries = vec![
            ("x-compressed.gif".to_string(), a),
            ("x-compressed-1.gif".to_string(), b),
            ("gone-compressed.gif".to_string(), dir.join("missing.gif")),
        ];
        let bytes = build_zip(&entries).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["x-compressed.gif", "x-compressed-1.gif"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
