//! Compression option model, frozen per job at admission.
//!
//! Options arrive as JSON from the upload form, are validated once, and are
//! stored verbatim on the job record. Retry re-uses the stored record; no
//! code path mutates options after admission.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lossy compression level bounds (gifsicle `--lossy`).
pub const MIN_COMPRESSION_LEVEL: u32 = 1;
pub const MAX_COMPRESSION_LEVEL: u32 = 200;

/// Palette size bounds (gifsicle `--colors`).
pub const MIN_COLORS: u32 = 2;
pub const MAX_COLORS: u32 = 256;

/// Frame dropping mode: keep every Nth frame of the animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropFrames {
    #[default]
    None,
    N2,
    N3,
    N4,
}

impl DropFrames {
    /// The Nth-frame interval, or `None` when no frames are dropped.
    pub fn keep_every(self) -> Option<u32> {
        match self {
            DropFrames::None => None,
            DropFrames::N2 => Some(2),
            DropFrames::N3 => Some(3),
            DropFrames::N4 => Some(4),
        }
    }

    /// Wire / bucket-key representation.
    pub fn as_str(self) -> &'static str {
        match self {
            DropFrames::None => "none",
            DropFrames::N2 => "n2",
            DropFrames::N3 => "n3",
            DropFrames::N4 => "n4",
        }
    }
}

/// The full per-job compression option record.
///
/// `#[serde(default)]` lets clients send only the fields they changed;
/// everything else falls back to [`CompressionOptions::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Lossy level, higher = smaller output / lower quality.
    pub compression_level: u32,
    pub drop_frames: DropFrames,
    pub reduce_colors: bool,
    /// Target palette size, applied only when `reduce_colors` is set.
    pub number_of_colors: u32,
    pub optimize_transparency: bool,
    pub undo_optimizations: bool,
    pub resize_enabled: bool,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            compression_level: 35,
            drop_frames: DropFrames::None,
            reduce_colors: false,
            number_of_colors: MAX_COLORS,
            optimize_transparency: false,
            undo_optimizations: false,
            resize_enabled: false,
            target_width: None,
            target_height: None,
        }
    }
}

impl CompressionOptions {
    /// Validate all ranges. Called once at admission; a job is never created
    /// from an invalid record.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&self.compression_level) {
            return Err(CoreError::Validation(format!(
                "compression_level must be between {MIN_COMPRESSION_LEVEL} and {MAX_COMPRESSION_LEVEL}"
            )));
        }
        if !(MIN_COLORS..=MAX_COLORS).contains(&self.number_of_colors) {
            return Err(CoreError::Validation(format!(
                "number_of_colors must be between {MIN_COLORS} and {MAX_COLORS}"
            )));
        }
        if self.target_width == Some(0) || self.target_height == Some(0) {
            return Err(CoreError::Validation(
                "resize target dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The effective palette size used for prediction: 256 when color
    /// reduction is disabled, the configured count otherwise.
    pub fn effective_colors(&self) -> u32 {
        if self.reduce_colors {
            self.number_of_colors
        } else {
            MAX_COLORS
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
