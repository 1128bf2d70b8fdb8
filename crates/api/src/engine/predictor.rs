//! Process-scoped prediction service.
//!
//! Wires the pure predictor math from `gifpress_core` to its persisted
//! state: the frozen baseline artifact loaded once at startup, and the
//! residual table living in the repository.

use std::path::Path;

use chrono::Utc;

use gifpress_core::predictor::{
    bucket_keys, fallback_log_secs, observed_residual, predict_ms, update_ema, BaselineModel,
    JobFeatures,
};
use gifpress_db::repositories::PredictionRepo;
use gifpress_db::DbPool;

pub struct Predictor {
    baseline: Option<BaselineModel>,
    db: DbPool,
}

impl Predictor {
    pub fn new(baseline: Option<BaselineModel>, db: DbPool) -> Self {
        Self { baseline, db }
    }

    /// Load the baseline artifact from disk. A missing or unreadable model
    /// is not fatal: estimation degrades to the fallback curve.
    pub fn load(path: &Path, db: DbPool) -> Self {
        let baseline = match BaselineModel::load(path) {
            Ok(model) => {
                tracing::info!(path = %path.display(), "Baseline prediction model loaded");
                Some(model)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "No baseline prediction model, using fallback estimates",
                );
                None
            }
        };
        Self::new(baseline, db)
    }

    fn baseline_log_secs(&self, features: &JobFeatures) -> f64 {
        match &self.baseline {
            Some(model) => model.predict_log_secs(features),
            None => fallback_log_secs(features.total_pixels),
        }
    }

    /// Estimate wall-clock processing time in milliseconds.
    pub async fn estimate_ms(&self, features: &JobFeatures) -> u64 {
        let keys = bucket_keys(features);
        let residuals = match PredictionRepo::get_residuals(&self.db, &keys).await {
            Ok(residuals) => residuals,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load residuals, predicting from baseline");
                Vec::new()
            }
        };
        predict_ms(self.baseline_log_secs(features), &residuals)
    }

    /// Learn from a completed job: append the training sample and fold the
    /// observed residual into every bucket the job belongs to.
    ///
    /// Persistence failures are logged and swallowed; prediction quality is
    /// never allowed to fail a job.
    pub async fn record(&self, job_id: &str, features: &JobFeatures, actual_ms: u64) {
        let now = Utc::now();

        match serde_json::to_value(features) {
            Ok(snapshot) => {
                if let Err(e) = PredictionRepo::insert_sample(
                    &self.db,
                    job_id,
                    &snapshot,
                    actual_ms as i64,
                    now,
                )
                .await
                {
                    tracing::warn!(job_id, error = %e, "Failed to record prediction sample");
                }
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Failed to serialize prediction features");
            }
        }

        let residual = observed_residual(self.baseline_log_secs(features), actual_ms);
        for key in bucket_keys(features) {
            let prev = match PredictionRepo::get_residual(&self.db, &key).await {
                Ok(prev) => prev,
                Err(e) => {
                    tracing::warn!(job_id, key, error = %e, "Failed to read residual");
                    continue;
                }
            };
            let (ema, count) = update_ema(prev, residual);
            if let Err(e) =
                PredictionRepo::upsert_residual(&self.db, &key, ema, count, now).await
            {
                tracing::warn!(job_id, key, error = %e, "Failed to update residual");
            }
        }
    }
}
