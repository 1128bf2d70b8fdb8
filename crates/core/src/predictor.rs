//! Two-layer processing-time prediction.
//!
//! Layer 1 is a frozen ridge-regression baseline shipped as a JSON artifact
//! produced offline from gifsicle profiling runs: an intercept, per-feature
//! coefficients, and per-feature standardization parameters. Layer 2 learns
//! exponential-moving-average corrections in log-seconds, keyed by coarse
//! job buckets, from observed completions.
//!
//! Everything in this module is pure; persistence of residual state lives
//! with the repositories.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::gifsicle::{resize_dimensions, GifInfo};
use crate::options::{CompressionOptions, DropFrames};

/// EMA smoothing factor for residual updates.
pub const RESIDUAL_ALPHA: f64 = 0.3;

/// Residual corrections are clamped to this many log-seconds either way.
pub const RESIDUAL_CLAMP: f64 = 0.5;

/// Buckets with fewer samples than this do not contribute to predictions.
pub const MIN_RESIDUAL_SAMPLES: i64 = 3;

/// Floor for any estimate, in milliseconds.
pub const MIN_PREDICTION_MS: f64 = 100.0;

// ---------------------------------------------------------------------------
// Baseline artifact
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("failed to read baseline model: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse baseline model: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Standardization parameters captured at training time.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerParams {
    pub mean: HashMap<String, f64>,
    pub scale: HashMap<String, f64>,
}

/// The frozen ridge baseline, deserialized from the training artifact.
///
/// Numeric and boolean features are standardized with [`ScalerParams`];
/// one-hot categorical features (`drop_frames_*`) are applied as 0/1
/// indicators. Output is `log1p(seconds)`.
#[derive(Debug, Clone, Deserialize)]
pub struct BaselineModel {
    pub intercept: f64,
    pub coefficients: HashMap<String, f64>,
    pub scaler: ScalerParams,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl BaselineModel {
    /// Load the artifact from disk.
    pub fn load(path: &Path) -> Result<Self, BaselineError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply the model to a feature vector, producing log-seconds.
    ///
    /// Application is data-driven off the coefficient names so training and
    /// runtime cannot drift: standardized features resolve through the
    /// scaler, `drop_frames_*` names resolve as indicators, and features
    /// with `scale = 0` are skipped.
    pub fn predict_log_secs(&self, features: &JobFeatures) -> f64 {
        let numeric = features.numeric_map();
        let mut sum = self.intercept;

        for (name, coef) in &self.coefficients {
            if let Some(mean) = self.scaler.mean.get(name) {
                let scale = self.scaler.scale.get(name).copied().unwrap_or(0.0);
                if scale == 0.0 {
                    continue;
                }
                let value = numeric.get(name.as_str()).copied().unwrap_or(0.0);
                sum += coef * (value - mean) / scale;
            } else if let Some(indicator) = features.one_hot(name) {
                sum += coef * indicator;
            }
        }

        sum
    }
}

/// Baseline used when no model artifact is available: a coarse log curve
/// over the pixel workload.
pub fn fallback_log_secs(total_pixels: f64) -> f64 {
    (total_pixels * 1e-7 + 0.5).ln_1p()
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// The runtime feature vector for one job, matching the training features
/// exactly.
#[derive(Debug, Clone, Serialize)]
pub struct JobFeatures {
    pub total_pixels: f64,
    pub target_pixels: f64,
    pub frames: f64,
    pub file_size_bytes: f64,
    pub target_width: f64,
    pub target_height: f64,
    pub number_of_colors: f64,
    pub compression_level: f64,
    pub reduce_colors: bool,
    pub optimize_transparency: bool,
    pub undo_optimizations: bool,
    pub drop_frames: DropFrames,
}

impl JobFeatures {
    /// Derive the feature vector from probed file facts and the frozen
    /// options. Target dimensions are the effective output dimensions:
    /// the resize result when a resize will be applied, the original
    /// dimensions otherwise.
    pub fn new(info: &GifInfo, opts: &CompressionOptions) -> Self {
        let (target_w, target_h) =
            resize_dimensions(opts, info.width, info.height).unwrap_or((info.width, info.height));

        Self {
            total_pixels: info.total_pixels() as f64,
            target_pixels: info.frames as f64 * target_w as f64 * target_h as f64,
            frames: info.frames as f64,
            file_size_bytes: info.size_bytes as f64,
            target_width: target_w as f64,
            target_height: target_h as f64,
            number_of_colors: opts.effective_colors() as f64,
            compression_level: opts.compression_level as f64,
            reduce_colors: opts.reduce_colors,
            optimize_transparency: opts.optimize_transparency,
            undo_optimizations: opts.undo_optimizations,
            drop_frames: opts.drop_frames,
        }
    }

    /// All standardized features by training name (booleans as 0/1).
    pub fn numeric_map(&self) -> HashMap<&'static str, f64> {
        let mut map = HashMap::new();
        map.insert("total_pixels", self.total_pixels);
        map.insert("target_pixels", self.target_pixels);
        map.insert("frames", self.frames);
        map.insert("file_size_bytes", self.file_size_bytes);
        map.insert("target_width", self.target_width);
        map.insert("target_height", self.target_height);
        map.insert("number_of_colors", self.number_of_colors);
        map.insert("compression_level", self.compression_level);
        map.insert("reduce_colors", self.reduce_colors as u8 as f64);
        map.insert("optimize_transparency", self.optimize_transparency as u8 as f64);
        map.insert("undo_optimizations", self.undo_optimizations as u8 as f64);
        map
    }

    /// Resolve a one-hot categorical coefficient name to its indicator.
    pub fn one_hot(&self, name: &str) -> Option<f64> {
        let value = name.strip_prefix("drop_frames_")?;
        Some((value == self.drop_frames.as_str()) as u8 as f64)
    }
}

// ---------------------------------------------------------------------------
// Residual buckets
// ---------------------------------------------------------------------------

/// Coarse size class by effective output pixel workload.
pub fn size_group(target_pixels: f64) -> &'static str {
    if target_pixels < 2e5 {
        "xs"
    } else if target_pixels < 1e6 {
        "s"
    } else if target_pixels < 4e6 {
        "m"
    } else {
        "l"
    }
}

/// Coarse compression class by lossy level.
pub fn compression_bucket(level: f64) -> &'static str {
    if level <= 0.0 {
        "none"
    } else if level <= 50.0 {
        "low"
    } else if level <= 100.0 {
        "medium"
    } else {
        "high"
    }
}

/// The residual bucket keys a job contributes to and reads from.
pub fn bucket_keys(features: &JobFeatures) -> Vec<String> {
    vec![
        format!("size_group={}", size_group(features.target_pixels)),
        format!("optimize_transparency={}", features.optimize_transparency as u8),
        format!("reduce_colors={}", features.reduce_colors as u8),
        format!("undo_optimizations={}", features.undo_optimizations as u8),
        format!("drop_frames={}", features.drop_frames.as_str()),
        format!(
            "compression_bucket={}",
            compression_bucket(features.compression_level)
        ),
    ]
}

/// One EMA step. The first sample seeds the average directly.
pub fn update_ema(prev: Option<(f64, i64)>, residual: f64) -> (f64, i64) {
    match prev {
        None => (residual, 1),
        Some((ema, count)) => (
            RESIDUAL_ALPHA * residual + (1.0 - RESIDUAL_ALPHA) * ema,
            count + 1,
        ),
    }
}

/// The residual a completed job observed against the baseline.
pub fn observed_residual(baseline_log_secs: f64, actual_ms: u64) -> f64 {
    (actual_ms as f64 / 1000.0).ln_1p() - baseline_log_secs
}

/// Combine the baseline with learned residuals into a millisecond estimate.
///
/// Only buckets with enough samples participate; their average is clamped
/// to ±[`RESIDUAL_CLAMP`] log-seconds.
pub fn predict_ms(baseline_log_secs: f64, residuals: &[(f64, i64)]) -> u64 {
    let active: Vec<f64> = residuals
        .iter()
        .filter(|(_, count)| *count >= MIN_RESIDUAL_SAMPLES)
        .map(|(ema, _)| *ema)
        .collect();

    let correction = if active.is_empty() {
        0.0
    } else {
        (active.iter().sum::<f64>() / active.len() as f64).clamp(-RESIDUAL_CLAMP, RESIDUAL_CLAMP)
    };

    let ms = 1000.0 * (baseline_log_secs + correction).exp_m1();
    ms.max(MIN_PREDICTION_MS) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_features() -> JobFeatures {
        let info = GifInfo {
            width: 640,
            height: 480,
            frames: 30,
            size_bytes: 2_000_000,
        };
        JobFeatures::new(&info, &CompressionOptions::default())
    }

    fn toy_model() -> BaselineModel {
        serde_json::from_str(
            r#"{
                "intercept": 1.0,
                "coefficients": {
                    "total_pixels": 0.5,
                    "frames": 0.2,
                    "drop_frames_none": 0.1,
                    "drop_frames_n2": -0.3
                },
                "scaler": {
                    "mean": {"total_pixels": 1000000.0, "frames": 20.0},
                    "scale": {"total_pixels": 500000.0, "frames": 10.0}
                }
            }"#,
        )
        .unwrap()
    }

    // -- features -------------------------------------------------------------

    #[test]
    fn features_without_resize_use_original_dimensions() {
        let f = sample_features();
        assert_eq!(f.total_pixels, 30.0 * 640.0 * 480.0);
        assert_eq!(f.target_pixels, f.total_pixels);
        assert_eq!(f.target_width, 640.0);
        assert_eq!(f.number_of_colors, 256.0);
    }

    #[test]
    fn features_with_resize_use_scaled_dimensions() {
        let info = GifInfo {
            width: 512,
            height: 512,
            frames: 10,
            size_bytes: 1_000_000,
        };
        let mut opts = CompressionOptions::default();
        opts.resize_enabled = true;
        opts.target_width = Some(384);
        opts.target_height = Some(256);

        let f = JobFeatures::new(&info, &opts);
        assert_eq!(f.target_width, 256.0);
        assert_eq!(f.target_height, 256.0);
        assert_eq!(f.target_pixels, 10.0 * 256.0 * 256.0);
    }

    #[test]
    fn one_hot_matches_only_active_category() {
        let f = sample_features();
        assert_eq!(f.one_hot("drop_frames_none"), Some(1.0));
        assert_eq!(f.one_hot("drop_frames_n2"), Some(0.0));
        assert_eq!(f.one_hot("something_else"), None);
    }

    // -- baseline -------------------------------------------------------------

    #[test]
    fn baseline_applies_standardization_and_one_hot() {
        let model = toy_model();
        let f = sample_features();

        // total_pixels z = (9216000 - 1e6) / 5e5, frames z = (30 - 20) / 10.
        let expected = 1.0
            + 0.5 * ((f.total_pixels - 1_000_000.0) / 500_000.0)
            + 0.2 * 1.0
            + 0.1; // drop_frames_none indicator
        assert!((model.predict_log_secs(&f) - expected).abs() < 1e-9);
    }

    #[test]
    fn baseline_skips_zero_scale_features() {
        let mut model = toy_model();
        model.scaler.scale.insert("total_pixels".into(), 0.0);
        let f = sample_features();

        let expected = 1.0 + 0.2 * 1.0 + 0.1;
        assert!((model.predict_log_secs(&f) - expected).abs() < 1e-9);
    }

    #[test]
    fn fallback_grows_with_workload() {
        let small = fallback_log_secs(100_000.0);
        let large = fallback_log_secs(10_000_000.0);
        assert!(large > small);
        assert!(small > 0.0);
    }

    // -- buckets --------------------------------------------------------------

    #[test]
    fn size_group_thresholds() {
        assert_eq!(size_group(100_000.0), "xs");
        assert_eq!(size_group(200_000.0), "s");
        assert_eq!(size_group(999_999.0), "s");
        assert_eq!(size_group(1_000_000.0), "m");
        assert_eq!(size_group(4_000_000.0), "l");
    }

    #[test]
    fn compression_bucket_thresholds() {
        assert_eq!(compression_bucket(0.0), "none");
        assert_eq!(compression_bucket(50.0), "low");
        assert_eq!(compression_bucket(51.0), "medium");
        assert_eq!(compression_bucket(100.0), "medium");
        assert_eq!(compression_bucket(101.0), "high");
    }

    #[test]
    fn bucket_keys_cover_all_dimensions() {
        let keys = bucket_keys(&sample_features());
        assert_eq!(keys.len(), 6);
        assert!(keys.contains(&"size_group=l".to_string()));
        assert!(keys.contains(&"drop_frames=none".to_string()));
        assert!(keys.contains(&"compression_bucket=low".to_string()));
        assert!(keys.contains(&"reduce_colors=0".to_string()));
    }

    // -- EMA ------------------------------------------------------------------

    #[test]
    fn ema_first_sample_seeds_directly() {
        assert_eq!(update_ema(None, 0.4), (0.4, 1));
    }

    #[test]
    fn ema_blends_with_alpha() {
        let (ema, count) = update_ema(Some((0.0, 1)), 1.0);
        assert!((ema - 0.3).abs() < 1e-12);
        assert_eq!(count, 2);
    }

    #[test]
    fn ema_matches_closed_form() {
        // After seeding with r0 and applying r1..rk, the EMA equals
        // (1-a)^k * r0 + sum a(1-a)^(k-i) r_i.
        let residuals = [0.5, -0.2, 0.8, 0.1, -0.4];
        let mut state = None;
        for r in residuals {
            state = Some(update_ema(state, r));
        }
        let (ema, count) = state.unwrap();
        assert_eq!(count, residuals.len() as i64);

        let a = RESIDUAL_ALPHA;
        let k = residuals.len() - 1;
        let mut expected = (1.0 - a).powi(k as i32) * residuals[0];
        for (i, r) in residuals.iter().enumerate().skip(1) {
            expected += a * (1.0 - a).powi((k - i) as i32) * r;
        }
        assert!((ema - expected).abs() < 1e-12);
    }

    // -- prediction -----------------------------------------------------------

    #[test]
    fn predict_without_residuals_uses_baseline_alone() {
        // log1p(2) baseline => expm1 round-trips to 2 seconds.
        let ms = predict_ms(2.0f64.ln_1p(), &[]);
        assert_eq!(ms, 2000);
    }

    #[test]
    fn predict_ignores_underpopulated_buckets() {
        let baseline = 2.0f64.ln_1p();
        let ms = predict_ms(baseline, &[(5.0, 2), (5.0, 1)]);
        assert_eq!(ms, 2000);
    }

    #[test]
    fn predict_clamps_residual_correction() {
        let baseline = 2.0f64.ln_1p();
        let unclamped = predict_ms(baseline, &[(10.0, 5)]);
        let at_clamp = (1000.0 * (baseline + RESIDUAL_CLAMP).exp_m1()) as u64;
        assert_eq!(unclamped, at_clamp);
    }

    #[test]
    fn predict_enforces_floor() {
        assert_eq!(predict_ms(-10.0, &[]), MIN_PREDICTION_MS as u64);
    }

    #[test]
    fn predict_averages_active_buckets() {
        let baseline = 1.0;
        // Active residuals 0.2 and -0.2 cancel out.
        let ms = predict_ms(baseline, &[(0.2, 3), (-0.2, 4), (9.0, 1)]);
        assert_eq!(ms, (1000.0 * 1.0f64.exp_m1()) as u64);
    }
}
