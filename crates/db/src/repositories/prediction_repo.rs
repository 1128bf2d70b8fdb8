//! Repository for predictor training samples and learned residuals.
//!
//! Samples are append-only; residuals are a small keyed table updated with
//! read-modify-write EMA steps. The update is intentionally not transactional
//! with the sample insert: corrections are clamped and averaged downstream,
//! so a stale read during a concurrent update is harmless.

use sqlx::types::Json;
use sqlx::QueryBuilder;

use gifpress_core::types::Timestamp;

use crate::models::prediction::ResidualEntry;
use crate::DbPool;

pub struct PredictionRepo;

impl PredictionRepo {
    /// Append one observed completion.
    pub async fn insert_sample(
        pool: &DbPool,
        job_id: &str,
        features: &serde_json::Value,
        elapsed_ms: i64,
        created_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO prediction_samples (job_id, features, elapsed_ms, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(Json(features))
        .bind(elapsed_ms)
        .bind(created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Insert or replace the EMA state for one bucket.
    pub async fn upsert_residual(
        pool: &DbPool,
        bucket_key: &str,
        ema: f64,
        sample_count: i64,
        updated_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO prediction_residuals (bucket_key, ema, sample_count, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(bucket_key) DO UPDATE SET \
                 ema = excluded.ema, \
                 sample_count = excluded.sample_count, \
                 updated_at = excluded.updated_at",
        )
        .bind(bucket_key)
        .bind(ema)
        .bind(sample_count)
        .bind(updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Current EMA state for one bucket.
    pub async fn get_residual(
        pool: &DbPool,
        bucket_key: &str,
    ) -> Result<Option<(f64, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT ema, sample_count FROM prediction_residuals WHERE bucket_key = ?",
        )
        .bind(bucket_key)
        .fetch_optional(pool)
        .await
    }

    /// EMA states for a set of buckets, in one query.
    pub async fn get_residuals(
        pool: &DbPool,
        bucket_keys: &[String],
    ) -> Result<Vec<(f64, i64)>, sqlx::Error> {
        if bucket_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::new(
            "SELECT ema, sample_count FROM prediction_residuals WHERE bucket_key IN (",
        );
        let mut values = qb.separated(", ");
        for key in bucket_keys {
            values.push_bind(key.clone());
        }
        qb.push(")");

        qb.build_query_as().fetch_all(pool).await
    }

    /// Every learned residual, for inspection.
    pub async fn all_residuals(pool: &DbPool) -> Result<Vec<ResidualEntry>, sqlx::Error> {
        sqlx::query_as(
            "SELECT bucket_key, ema, sample_count, updated_at \
             FROM prediction_residuals ORDER BY bucket_key",
        )
        .fetch_all(pool)
        .await
    }

    /// Total number of recorded samples.
    pub async fn sample_count(pool: &DbPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM prediction_samples")
            .fetch_one(pool)
            .await
    }
}
