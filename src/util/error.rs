//! Error types for msdetect.

use thiserror::Error;

/// Result alias for msdetect operations.
pub type DetectResult<T> = std::result::Result<T, DetectError>;

/// Boxed error returned by external collaborators such as a scoring network.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while planning, scoring, extracting or persisting
/// detections.
#[derive(Debug, Error)]
pub enum DetectError {
    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
    /// The scale planner produced no usable scale.
    #[error("0 resolutions to compute (max size {max_size:?})")]
    NoScales { max_size: Option<usize> },
    /// Zero-padding factors must lie in `[0, 1]`.
    #[error("zero padding factors must be in [0, 1], got ({hpad}, {wpad})")]
    InvalidPadFactor { hpad: f32, wpad: f32 },
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: {channels}x{height}x{width}")]
    InvalidDimensions {
        channels: usize,
        height: usize,
        width: usize,
    },
    /// Backing buffer is smaller than the declared dimensions.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Requested region has no overlap with the source image.
    #[error(
        "region ({top}, {left}) {height}x{width} is outside of a {img_height}x{img_width} image"
    )]
    InvalidRegion {
        top: f32,
        left: f32,
        height: f32,
        width: f32,
        img_height: usize,
        img_width: usize,
    },
    /// Index is outside the valid range for the given context.
    #[error("{context} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// The canvas of a scale was not retained (ping-pong buffer mode).
    #[error("canvas of scale {scale} is not retained in ping-pong buffer mode")]
    CanvasUnavailable { scale: usize },
    /// The scoring module failed on a canvas.
    #[error("scoring failed at scale {scale}: {source}")]
    Scoring {
        scale: usize,
        #[source]
        source: BoxedError,
    },
    /// The resizing collaborator failed.
    #[error("resize failed: {reason}")]
    Resize { reason: String },
    /// Reading or writing a file failed.
    #[error("i/o error on {path}: {reason}")]
    Io { path: String, reason: String },
    /// A line of a bounding-box file could not be parsed.
    #[error("parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },
    /// No group with this name exists in the collection.
    #[error("could not find group {name} in existing bboxes")]
    UnknownGroup { name: String },
    /// Image encode or decode failed.
    #[cfg(feature = "image-io")]
    #[error("image i/o error: {reason}")]
    ImageIo { reason: String },
}

impl DetectError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
