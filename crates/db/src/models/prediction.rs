//! Rows backing the predictor's learned state.

use gifpress_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// One observed completion, appended for offline retraining.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PredictionSample {
    pub id: i64,
    pub job_id: Option<String>,
    #[sqlx(json)]
    pub features: serde_json::Value,
    pub elapsed_ms: i64,
    pub created_at: Timestamp,
}

/// Learned residual correction for one coarse bucket.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ResidualEntry {
    pub bucket_key: String,
    /// Exponential moving average of the residual, in log-seconds.
    pub ema: f64,
    pub sample_count: i64,
    pub updated_at: Timestamp,
}
