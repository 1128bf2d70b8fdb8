//! Timed progress animation for the processing phase.
//!
//! gifsicle emits no progress, so the worker synthesizes it: from the moment
//! processing begins, an internal counter rises from 10 toward 99 along a
//! schedule whose expected completion matches the predictor's estimate. The
//! internal counter maps into the client-visible 25..99 band; 100 is only
//! ever written on success.

use std::time::Duration;

use crate::gifsicle::GifInfo;
use crate::options::CompressionOptions;

/// Display progress when a job enters the processing phase.
pub const PROCESSING_FLOOR: i64 = 25;

/// Display progress never exceeds this until the tool exits.
pub const PROCESSING_CEILING: i64 = 99;

/// Internal animator range.
const INTERNAL_START: f64 = 10.0;
const INTERNAL_END: f64 = 99.0;

/// Bounds on a single animator tick.
const MIN_TICK_MS: f64 = 80.0;
const MAX_TICK_MS: f64 = 4000.0;

/// Increment bounds per tick, in internal progress units.
const MIN_INCREMENT: f64 = 1.0;
const MAX_INCREMENT: f64 = 12.0;

/// Tuning constant relating work factor to increment size.
const INCREMENT_SCALE: f64 = 40.0;

/// The animation schedule for one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimatorPlan {
    /// Internal progress units added per tick.
    pub increment: f64,
    /// Delay between ticks.
    pub tick: Duration,
}

impl AnimatorPlan {
    /// Where the internal counter starts.
    pub fn start(&self) -> f64 {
        INTERNAL_START
    }

    /// Advance the internal counter by one tick, saturating at the ceiling.
    pub fn advance(&self, internal: f64) -> f64 {
        (internal + self.increment).min(INTERNAL_END)
    }
}

/// A unitless measure of how heavy a job is for the animator.
///
/// The pixel workload enters through its logarithm, so the derived increment
/// shrinks only slowly as jobs grow; option multipliers push it further for
/// the modes that make gifsicle work harder.
pub fn work_factor(info: &GifInfo, opts: &CompressionOptions) -> f64 {
    let pixels = info.total_pixels().max(10) as f64;
    let mut factor = pixels.log10().max(1.0);

    factor *= 1.0 + opts.compression_level as f64 / 200.0;
    if opts.optimize_transparency {
        factor *= 1.3;
    }
    if opts.undo_optimizations {
        factor *= 1.2;
    }
    if opts.reduce_colors {
        factor *= 1.25;
    }
    factor
}

/// Derive the animation schedule from the time estimate and job shape.
///
/// Small jobs get large increments and fast ticks; large jobs get small
/// increments and slow ticks. Absent the tick clamp, the schedule finishes
/// exactly at `estimate_ms`.
pub fn plan(estimate_ms: u64, info: &GifInfo, opts: &CompressionOptions) -> AnimatorPlan {
    let factor = work_factor(info, opts);
    let increment = (INCREMENT_SCALE / factor).clamp(MIN_INCREMENT, MAX_INCREMENT);

    let span = INTERNAL_END - INTERNAL_START;
    let steps = span / increment;
    let tick_ms = (estimate_ms as f64 / steps).clamp(MIN_TICK_MS, MAX_TICK_MS);

    AnimatorPlan {
        increment,
        tick: Duration::from_millis(tick_ms as u64),
    }
}

/// Map internal 0..100 progress into the client-visible 25..99 band.
pub fn display_progress(internal: f64) -> i64 {
    let clamped = internal.clamp(0.0, 100.0);
    let display = PROCESSING_FLOOR as f64
        + clamped / 100.0 * (PROCESSING_CEILING - PROCESSING_FLOOR) as f64;
    (display.round() as i64).min(PROCESSING_CEILING)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32, frames: u32) -> GifInfo {
        GifInfo {
            width,
            height,
            frames,
            size_bytes: 1024,
        }
    }

    #[test]
    fn display_maps_into_processing_band() {
        assert_eq!(display_progress(0.0), 25);
        assert_eq!(display_progress(100.0), 99);
        assert!(display_progress(INTERNAL_START) > PROCESSING_FLOOR);
        assert!(display_progress(INTERNAL_END) <= PROCESSING_CEILING);
    }

    #[test]
    fn display_clamps_out_of_range_input() {
        assert_eq!(display_progress(-50.0), 25);
        assert_eq!(display_progress(500.0), 99);
    }

    #[test]
    fn display_is_monotonic() {
        let mut last = 0;
        for i in 0..=100 {
            let d = display_progress(i as f64);
            assert!(d >= last);
            last = d;
        }
    }

    #[test]
    fn small_jobs_get_larger_increments_than_large_jobs() {
        let opts = CompressionOptions::default();
        let small = plan(500, &info(100, 100, 2), &opts);
        let large = plan(60_000, &info(1920, 1080, 120), &opts);

        assert!(small.increment > large.increment);
        assert!(small.tick < large.tick);
    }

    #[test]
    fn heavy_options_slow_the_animation() {
        let plain = CompressionOptions::default();
        let mut heavy = CompressionOptions::default();
        heavy.compression_level = 200;
        heavy.optimize_transparency = true;
        heavy.undo_optimizations = true;
        heavy.reduce_colors = true;

        let gif = info(640, 480, 30);
        assert!(work_factor(&gif, &heavy) > work_factor(&gif, &plain));
        assert!(plan(10_000, &gif, &heavy).increment <= plan(10_000, &gif, &plain).increment);
    }

    #[test]
    fn schedule_completion_tracks_estimate() {
        let opts = CompressionOptions::default();
        let gif = info(640, 480, 30);
        let estimate_ms = 20_000u64;

        let p = plan(estimate_ms, &gif, &opts);
        let steps = ((INTERNAL_END - INTERNAL_START) / p.increment).ceil();
        let total_ms = steps * p.tick.as_millis() as f64;

        // Within the tick clamp the schedule should land near the estimate.
        assert!((total_ms - estimate_ms as f64).abs() / (estimate_ms as f64) < 0.25);
    }

    #[test]
    fn advance_saturates_at_ceiling() {
        let p = AnimatorPlan {
            increment: 50.0,
            tick: Duration::from_millis(100),
        };
        let next = p.advance(80.0);
        assert_eq!(next, INTERNAL_END);
        assert_eq!(p.advance(next), INTERNAL_END);
    }
}
