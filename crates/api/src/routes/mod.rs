//! Route definitions for the REST surface under `/api`.
//!
//! ```text
//! GET    /health                    liveness check
//! POST   /upload                    multipart batch admission
//! GET    /jobs                      list with filters + pagination
//! GET    /jobs/counts               per-status counts
//! GET    /jobs/{id}                 single job
//! DELETE /jobs/{id}                 delete record + artifacts (any state)
//! POST   /jobs/{id}/retry           re-enqueue a failed job
//! GET    /download/{id}             compressed artifact (attachment)
//! GET    /download/{id}/original    original artifact (inline)
//! GET    /download/zip/archive      bulk ZIP of completed artifacts
//! GET    /queue/config              worker pool gauges
//! PUT    /queue/config              adjust worker concurrency
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{downloads, health, jobs, queue, upload};
use crate::state::AppState;

/// Build the `/api` route tree.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/upload", post(upload::upload))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/counts", get(jobs::job_counts))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/{id}/retry", post(jobs::retry_job))
        // The static zip segment takes priority over the `{id}` match.
        .route("/download/zip/archive", get(downloads::zip_archive))
        .route("/download/{id}", get(downloads::download_compressed))
        .route("/download/{id}/original", get(downloads::download_original))
        .route(
            "/queue/config",
            get(queue::get_config).put(queue::set_config),
        )
}
