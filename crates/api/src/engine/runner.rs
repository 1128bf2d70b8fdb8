//! Per-job execution: status transitions, progress animation, gifsicle
//! invocation, and predictor feedback.
//!
//! The runner owns all repository updates for a job while it executes, so
//! published events for that job match the order of its database writes.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use gifpress_core::gifsicle;
use gifpress_core::predictor::JobFeatures;
use gifpress_core::progress::{self, AnimatorPlan, PROCESSING_FLOOR};
use gifpress_db::models::job::{CompletedArtifact, Job, JobStatus};
use gifpress_db::repositories::JobRepo;
use gifpress_db::DbPool;
use gifpress_events::{EventBus, JobStatusPayload};

use crate::config::ServerConfig;
use crate::engine::pool::JobExecutor;
use crate::engine::Predictor;
use crate::storage::ArtifactStore;

/// The production executor driving gifsicle.
pub struct JobRunner {
    db: DbPool,
    bus: Arc<EventBus>,
    store: Arc<ArtifactStore>,
    predictor: Arc<Predictor>,
    config: Arc<ServerConfig>,
}

impl JobRunner {
    pub fn new(
        db: DbPool,
        bus: Arc<EventBus>,
        store: Arc<ArtifactStore>,
        predictor: Arc<Predictor>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            db,
            bus,
            store,
            predictor,
            config,
        }
    }

    async fn run(&self, job: Job) {
        let job_id = job.id.clone();

        match self.process(&job).await {
            Ok(()) => {}
            Err(message) => {
                tracing::warn!(job_id = %job_id, error = %message, "Job failed");
                match JobRepo::fail(&self.db, &job_id, &message, Utc::now()).await {
                    Ok(Some(_)) => {
                        self.bus.publish_job(
                            &job_id,
                            JobStatusPayload {
                                status: JobStatus::Failed.as_str().to_string(),
                                progress: 0,
                                error_message: Some(message),
                                ..Default::default()
                            },
                        );
                    }
                    Ok(None) => {
                        tracing::debug!(job_id = %job_id, "Job deleted before failure recorded");
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to mark job failed");
                    }
                }
            }
        }
    }

    /// Drive one job through `processing` to a terminal state. An `Err`
    /// carries the user-facing failure message.
    async fn process(&self, job: &Job) -> Result<(), String> {
        // 1. Enter processing. The guard makes this a no-op when the job was
        //    deleted (or otherwise left `queued`) while waiting in the pool.
        let marked = JobRepo::mark_processing(&self.db, &job.id, Utc::now(), PROCESSING_FLOOR)
            .await
            .map_err(|e| format!("failed to update job record: {e}"))?;
        if marked.is_none() {
            tracing::debug!(job_id = %job.id, "Job no longer queued, skipping");
            return Ok(());
        }
        self.bus.publish_job(
            &job.id,
            JobStatusPayload {
                status: JobStatus::Processing.as_str().to_string(),
                progress: PROCESSING_FLOOR,
                ..Default::default()
            },
        );

        let input = job
            .original_path
            .as_deref()
            .ok_or_else(|| "original file missing".to_string())?;

        // 2. Probe the source and ask the predictor for a time estimate.
        let info = gifsicle::probe(&self.config.gifsicle_path, Path::new(input))
            .await
            .map_err(|e| e.to_string())?;
        let features = JobFeatures::new(&info, &job.options);
        let estimate_ms = self.predictor.estimate_ms(&features).await;
        tracing::debug!(job_id = %job.id, estimate_ms, "Processing estimate");

        // 3. Animate progress while the tool runs.
        let plan = progress::plan(estimate_ms, &info, &job.options);
        let animator_cancel = CancellationToken::new();
        let animator = tokio::spawn(animate(
            self.db.clone(),
            Arc::clone(&self.bus),
            job.id.clone(),
            plan,
            animator_cancel.clone(),
        ));

        // 4. Run gifsicle.
        let output_path = self.store.allocate_output();
        let started = Instant::now();
        let result = gifsicle::compress(
            &self.config.gifsicle_path,
            &job.options,
            &info,
            Path::new(input),
            &output_path,
        )
        .await;
        let actual_ms = started.elapsed().as_millis() as u64;

        animator_cancel.cancel();
        let _ = animator.await;

        let output = result.map_err(|e| e.to_string())?;

        // 5. Persist completion and notify.
        let reduction = reduction_percent(job.original_size, output.size_bytes as i64);
        let expires_at = self
            .config
            .retention_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        let artifact = CompletedArtifact {
            path: output.path.to_string_lossy().into_owned(),
            size: output.size_bytes as i64,
            width: output.width as i64,
            height: output.height as i64,
            reduction_percent: reduction,
        };

        let completed = JobRepo::complete(&self.db, &job.id, &artifact, Utc::now(), expires_at)
            .await
            .map_err(|e| format!("failed to update job record: {e}"))?;
        if completed.is_none() {
            // Deleted mid-flight; drop the orphaned output.
            tracing::debug!(job_id = %job.id, "Job deleted during processing, discarding output");
            let _ = self.store.remove(&artifact.path).await;
            return Ok(());
        }

        self.bus.publish_job(
            &job.id,
            JobStatusPayload {
                status: JobStatus::Completed.as_str().to_string(),
                progress: 100,
                compressed_size: Some(artifact.size),
                compressed_width: Some(artifact.width),
                compressed_height: Some(artifact.height),
                reduction_percent: Some(artifact.reduction_percent),
                error_message: None,
            },
        );

        tracing::info!(
            job_id = %job.id,
            original_size = job.original_size,
            compressed_size = artifact.size,
            reduction = artifact.reduction_percent,
            actual_ms,
            estimate_ms,
            "Job completed",
        );

        // 6. Feed the observation back into the predictor.
        self.predictor.record(&job.id, &features, actual_ms).await;

        Ok(())
    }
}

#[async_trait::async_trait]
impl JobExecutor for JobRunner {
    async fn execute(&self, job_id: String) {
        let job = match JobRepo::find_by_id(&self.db, &job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Queued => job,
            Ok(Some(job)) => {
                tracing::debug!(job_id = %job_id, status = job.status.as_str(), "Skipping non-queued job");
                return;
            }
            Ok(None) => {
                tracing::debug!(job_id = %job_id, "Job vanished before execution");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
                return;
            }
        };
        self.run(job).await;
    }
}

/// Timed progress loop: ticks the display value toward 99 until cancelled.
///
/// The repository guard refuses writes once the job leaves `processing`, so
/// a tick racing with completion is harmless.
async fn animate(
    db: DbPool,
    bus: Arc<EventBus>,
    job_id: String,
    plan: AnimatorPlan,
    cancel: CancellationToken,
) {
    let mut internal = plan.start();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(plan.tick) => {}
        }

        let previous = internal;
        internal = plan.advance(internal);
        let display = progress::display_progress(internal);

        match JobRepo::update_progress(&db, &job_id, display).await {
            Ok(true) => {
                bus.publish_job(
                    &job_id,
                    JobStatusPayload {
                        status: JobStatus::Processing.as_str().to_string(),
                        progress: display,
                        ..Default::default()
                    },
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Progress tick failed");
            }
        }

        // Saturated at the ceiling; nothing further to animate.
        if internal == previous {
            cancel.cancelled().await;
            break;
        }
    }
}

/// Size reduction achieved, as a percentage rounded to one decimal.
pub fn reduction_percent(original_size: i64, compressed_size: i64) -> f64 {
    if original_size <= 0 {
        return 0.0;
    }
    let ratio = 100.0 * (original_size - compressed_size) as f64 / original_size as f64;
    (ratio * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
