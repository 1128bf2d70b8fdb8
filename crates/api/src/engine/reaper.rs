//! Periodic cleanup of expired jobs and their artifacts.
//!
//! Runs on a fixed interval using `tokio::time::interval`. Not
//! time-critical: a failed sweep is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use gifpress_db::repositories::JobRepo;
use gifpress_db::DbPool;

use crate::storage::ArtifactStore;

/// Run the reaper loop until `cancel` is triggered.
pub async fn run(
    pool: DbPool,
    store: Arc<ArtifactStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Reaper started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reaper stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep_once(&pool, &store).await {
                    Ok(0) => tracing::debug!("Reaper: nothing to purge"),
                    Ok(removed) => tracing::info!(removed, "Reaper: purged expired jobs"),
                    Err(e) => tracing::error!(error = %e, "Reaper: sweep failed"),
                }
            }
        }
    }
}

/// One sweep: delete every expired job's artifacts and record.
///
/// Missing files are ignored; deletes may race with concurrent completions
/// and are best-effort.
pub async fn sweep_once(pool: &DbPool, store: &ArtifactStore) -> Result<usize, sqlx::Error> {
    let expired = JobRepo::expired(pool, Utc::now()).await?;
    let mut removed = 0;

    for job in expired {
        if let Some(path) = &job.compressed_path {
            if let Err(e) = store.remove(path).await {
                tracing::warn!(job_id = %job.id, path, error = %e, "Failed to remove artifact");
            }
        }
        if let Some(path) = &job.original_path {
            if let Err(e) = store.remove(path).await {
                tracing::warn!(job_id = %job.id, path, error = %e, "Failed to remove artifact");
            }
        }
        if JobRepo::delete(pool, &job.id).await? {
            removed += 1;
        }
    }

    Ok(removed)
}
