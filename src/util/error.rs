//! Error types for detpost.

use thiserror::Error;

/// Result alias for detpost operations.
pub type DetPostResult<T> = std::result::Result<T, DetPostError>;

/// Errors that can occur when configuring or running the detection pipeline.
///
/// Configuration errors surface once at [`Detector::new`](crate::Detector::new);
/// shape errors surface per call, before any output is produced.
#[derive(Debug, Error, PartialEq)]
pub enum DetPostError {
    /// The NMS overlap threshold is not in `(0, +inf)`.
    #[error("nms threshold must be positive and finite, got {value}")]
    InvalidNmsThreshold { value: f32 },
    /// Fewer than two classes configured (background plus at least one object class).
    #[error("num_classes must be at least 2, got {num_classes}")]
    InvalidClassCount { num_classes: usize },
    /// The background label does not name a configured class.
    #[error("background label {background_label} out of range for {num_classes} classes")]
    BackgroundOutOfRange {
        background_label: usize,
        num_classes: usize,
    },
    /// The global per-image keep limit is zero.
    #[error("keep_top_k must be at least 1")]
    InvalidKeepTopK,
    /// A variance component is not strictly positive.
    #[error("variance components must be positive and finite, got {value}")]
    InvalidVariance { value: f32 },
    /// The detector was constructed without any prior boxes.
    #[error("prior box set must not be empty")]
    EmptyPriors,
    /// Offsets and priors must pair up one to one.
    #[error("expected one offset per prior: {offsets} offsets vs {priors} priors")]
    PriorCountMismatch { offsets: usize, priors: usize },
    /// Boxes and scores must pair up one to one.
    #[error("expected one score per box: {boxes} boxes vs {scores} scores")]
    ScoreCountMismatch { boxes: usize, scores: usize },
    /// A flat buffer does not match its declared shape.
    #[error("{context}: expected {expected} elements, got {got}")]
    ShapeMismatch {
        expected: usize,
        got: usize,
        context: &'static str,
    },
    /// The location tensor cannot be split into per-image blocks.
    #[error("location tensor length {len} is not a multiple of num_priors * 4 = {stride}")]
    BadLocLength { len: usize, stride: usize },
    /// The confidence tensor disagrees with the batch implied by the location tensor.
    #[error("confidence tensor length {got}, expected {expected} for a batch of {batch}")]
    BadConfLength {
        expected: usize,
        got: usize,
        batch: usize,
    },
    /// An index points outside the collection it refers to.
    #[error("index {index} out of bounds for {len} {context}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
}
