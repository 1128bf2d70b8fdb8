//! gifsicle invocation: probing, argument construction, and execution.
//!
//! The external tool is treated as a black box with a documented option
//! surface. Argument construction is deterministic and fully covered by
//! unit tests; the async wrappers spawn `tokio::process::Command` and await
//! termination.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::options::{CompressionOptions, DropFrames, MAX_COLORS};

/// Stderr captured into a failure message is truncated to this many bytes.
const MAX_STDERR_BYTES: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum GifsicleError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gifsicle exited with code {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("output file missing after successful exit: {0}")]
    OutputMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Probed facts about a GIF file.
///
/// When the info output cannot be parsed the probe degrades to
/// `(0, 0, 1, size)` so downstream estimation still produces a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GifInfo {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub size_bytes: u64,
}

impl GifInfo {
    /// `frames * width * height`, the main workload measure.
    pub fn total_pixels(&self) -> u64 {
        self.frames as u64 * self.width as u64 * self.height as u64
    }
}

/// Result of a successful compression run.
#[derive(Debug, Clone)]
pub struct CompressedOutput {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// Parse `(width, height, frames)` out of `gifsicle --info` text output.
///
/// The two patterns of interest look like:
///
/// ```text
/// * input.gif 30 images
///   logical screen 640x480
/// ```
pub fn parse_info(output: &str) -> Option<(u32, u32, u32)> {
    let mut dims: Option<(u32, u32)> = None;
    let mut frames: Option<u32> = None;

    for line in output.lines() {
        if dims.is_none() {
            if let Some(rest) = line.trim().strip_prefix("logical screen ") {
                dims = parse_dimensions(rest);
            }
        }
        if frames.is_none() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            for pair in tokens.windows(2) {
                if pair[1] == "images" || pair[1] == "image" {
                    if let Ok(n) = pair[0].parse() {
                        frames = Some(n);
                        break;
                    }
                }
            }
        }
        if dims.is_some() && frames.is_some() {
            break;
        }
    }

    let (w, h) = dims?;
    Some((w, h, frames.unwrap_or(1)))
}

/// Parse `"WxH"` out of the remainder of a `logical screen` line.
fn parse_dimensions(rest: &str) -> Option<(u32, u32)> {
    let mut parts = rest.split_whitespace().next()?.split('x');
    let w = parts.next()?.parse().ok()?;
    let h = parts.next()?.parse().ok()?;
    Some((w, h))
}

/// Run `gifsicle --info` on a file and return what could be learned.
///
/// The file size always comes from a stat; width/height/frames degrade to
/// `(0, 0, 1)` when the tool fails or its output is unparseable.
pub async fn probe(binary: &str, path: &Path) -> Result<GifInfo, GifsicleError> {
    let size_bytes = tokio::fs::metadata(path).await?.len();

    let output = Command::new(binary)
        .arg("--info")
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| GifsicleError::Spawn {
            binary: binary.to_string(),
            source,
        })?;

    let text = String::from_utf8_lossy(&output.stdout);
    let (width, height, frames) = match parse_info(&text) {
        Some(parsed) => parsed,
        None => {
            tracing::debug!(path = %path.display(), "gifsicle info output unparseable, degrading");
            (0, 0, 1)
        }
    };

    Ok(GifInfo {
        width,
        height,
        frames,
        size_bytes,
    })
}

// ---------------------------------------------------------------------------
// Argument construction
// ---------------------------------------------------------------------------

/// Compute the output dimensions for the resize option, or `None` when no
/// resize argument should be emitted.
///
/// Rules:
/// - Both targets present: best-fit scale `min(Wt/Wo, Ht/Ho, 1)`; skip at 1.
/// - Width only, smaller than the original: scale width, derive height.
/// - Height only, smaller than the original: scale height, derive width.
/// - Never upscale.
pub fn resize_dimensions(
    opts: &CompressionOptions,
    orig_width: u32,
    orig_height: u32,
) -> Option<(u32, u32)> {
    if !opts.resize_enabled || orig_width == 0 || orig_height == 0 {
        return None;
    }

    let (ow, oh) = (orig_width as f64, orig_height as f64);
    match (opts.target_width, opts.target_height) {
        (Some(tw), Some(th)) => {
            let scale = (tw as f64 / ow).min(th as f64 / oh).min(1.0);
            if scale >= 1.0 {
                return None;
            }
            Some((
                (ow * scale).round().max(1.0) as u32,
                (oh * scale).round().max(1.0) as u32,
            ))
        }
        (Some(tw), None) if tw < orig_width => {
            Some((tw, (oh * tw as f64 / ow).round().max(1.0) as u32))
        }
        (None, Some(th)) if th < orig_height => {
            Some(((ow * th as f64 / oh).round().max(1.0) as u32, th))
        }
        _ => None,
    }
}

/// Zero-indexed frame selectors that keep every Nth frame, starting at N.
///
/// For `n3` over 12 frames this yields `#2 #5 #8 #11`.
pub fn frame_selectors(drop: DropFrames, frames: u32) -> Vec<String> {
    let Some(n) = drop.keep_every() else {
        return Vec::new();
    };
    (0..frames / n).map(|i| format!("#{}", (i + 1) * n - 1)).collect()
}

/// Build the full gifsicle argument list for one job.
///
/// The order is significant for the tool: options, input path, frame
/// selectors, then the output flag.
pub fn build_args(
    opts: &CompressionOptions,
    info: &GifInfo,
    input: &Path,
    output: &Path,
) -> Vec<String> {
    let mut args = Vec::new();

    args.push(format!("--lossy={}", opts.compression_level));
    args.push("-O3".to_string());

    if opts.undo_optimizations {
        args.push("--unoptimize".to_string());
    }

    if opts.reduce_colors && opts.number_of_colors < MAX_COLORS {
        args.push("--colors".to_string());
        args.push(opts.number_of_colors.to_string());
    }

    if let Some((w, h)) = resize_dimensions(opts, info.width, info.height) {
        args.push("--resize".to_string());
        args.push(format!("{w}x{h}"));
    }

    args.push(input.to_string_lossy().into_owned());
    args.extend(frame_selectors(opts.drop_frames, info.frames));

    args.push("-o".to_string());
    args.push(output.to_string_lossy().into_owned());

    args
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Truncate captured stderr to a bounded, char-safe message.
fn truncate_stderr(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.len() <= MAX_STDERR_BYTES {
        return trimmed.to_string();
    }
    let mut end = MAX_STDERR_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

/// Run gifsicle over `input`, writing to `output`.
///
/// On a zero exit the output file is stat'd for its size and re-probed for
/// its dimensions. Non-zero exits fail with the captured stderr; a missing
/// output file after a clean exit fails with [`GifsicleError::OutputMissing`].
pub async fn compress(
    binary: &str,
    opts: &CompressionOptions,
    info: &GifInfo,
    input: &Path,
    output: &Path,
) -> Result<CompressedOutput, GifsicleError> {
    let args = build_args(opts, info, input, output);
    tracing::debug!(binary, ?args, "invoking gifsicle");

    let result = Command::new(binary)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| GifsicleError::Spawn {
            binary: binary.to_string(),
            source,
        })?;

    if !result.status.success() {
        return Err(GifsicleError::ToolFailed {
            code: result.status.code(),
            stderr: truncate_stderr(&result.stderr),
        });
    }

    let size_bytes = match tokio::fs::metadata(output).await {
        Ok(meta) => meta.len(),
        Err(_) => return Err(GifsicleError::OutputMissing(output.to_path_buf())),
    };

    let probed = probe(binary, output).await?;

    Ok(CompressedOutput {
        path: output.to_path_buf(),
        size_bytes,
        width: probed.width,
        height: probed.height,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
