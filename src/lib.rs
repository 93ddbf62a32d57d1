//! DetPost is the post-processing stage of a prior-box (anchor) object
//! detector: it decodes predicted offsets against prior boxes, suppresses
//! redundant overlapping detections per class, and returns a bounded,
//! globally ranked detection list per image.
//!
//! The pipeline is a pure in-process transformation with optional batch
//! parallelism via the `rayon` feature; tracing instrumentation is available
//! behind the `tracing` feature.

pub mod boxes;
pub mod codec;
pub mod merge;
pub mod pipeline;
pub mod scores;
pub mod suppress;
mod trace;
pub mod util;

pub use boxes::{CornerBox, LocOffset, PriorBox, Variance};
pub use codec::{decode, decode_into};
pub use merge::{merge, Candidate, Detection};
pub use pipeline::{DetectConfig, Detector, OutputTensor};
pub use scores::{ConfLayout, ConfidenceMatrix};
pub use suppress::{nms, nms_over};
pub use util::{DetPostError, DetPostResult};
