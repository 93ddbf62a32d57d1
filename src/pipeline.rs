//! Batch orchestration: decode, per-class suppression and global merging.

use crate::boxes::{LocOffset, PriorBox, Variance};
use crate::codec::decode;
use crate::merge::{merge, Detection};
use crate::scores::{ConfLayout, ConfidenceMatrix};
use crate::suppress::nms_over;
use crate::trace::{trace_event, trace_span};
use crate::util::{DetPostError, DetPostResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Detection post-processing configuration.
///
/// Validated once at [`Detector::new`]; invalid values are configuration
/// errors, never per-call errors.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectConfig {
    /// Total number of classes, including background. Must be at least 2.
    pub num_classes: usize,
    /// Class index excluded from suppression and merging.
    pub background_label: usize,
    /// Global per-image cap on final detections. Must be at least 1.
    pub keep_top_k: usize,
    /// Minimum score for a box to enter per-class NMS (strict comparison).
    pub conf_thresh: f32,
    /// IoU threshold at or above which an overlapping box is suppressed.
    /// Must be positive and finite.
    pub nms_threshold: f32,
    /// Per-class survivor cap fed to NMS; `None` (or `Some(0)`) means uncapped.
    pub nms_top_k: Option<usize>,
    /// Offset rescaling constants used during decoding.
    pub variance: Variance,
    /// Layout of the flat confidence tensor passed to [`Detector::run`].
    pub conf_layout: ConfLayout,
    /// Process batch images on the rayon thread pool (requires the `rayon`
    /// feature; ignored otherwise). Results are identical either way.
    pub parallel: bool,
}

impl Default for DetectConfig {
    /// SSD/VOC defaults: 21 classes, background 0, keep 200 of up to 400
    /// per-class survivors at IoU 0.45, confidence floor 0.01.
    fn default() -> Self {
        Self {
            num_classes: 21,
            background_label: 0,
            keep_top_k: 200,
            conf_thresh: 0.01,
            nms_threshold: 0.45,
            nms_top_k: Some(400),
            variance: Variance::default(),
            conf_layout: ConfLayout::default(),
            parallel: false,
        }
    }
}

impl DetectConfig {
    /// Checks every configuration invariant.
    pub fn validate(&self) -> DetPostResult<()> {
        if self.num_classes < 2 {
            return Err(DetPostError::InvalidClassCount {
                num_classes: self.num_classes,
            });
        }
        if self.background_label >= self.num_classes {
            return Err(DetPostError::BackgroundOutOfRange {
                background_label: self.background_label,
                num_classes: self.num_classes,
            });
        }
        if self.keep_top_k == 0 {
            return Err(DetPostError::InvalidKeepTopK);
        }
        if !self.nms_threshold.is_finite() || self.nms_threshold <= 0.0 {
            return Err(DetPostError::InvalidNmsThreshold {
                value: self.nms_threshold,
            });
        }
        self.variance.validate()
    }
}

/// Fixed-shape output buffer of shape `[batch, keep_top_k, 7]`.
///
/// Rows are `(image_id, label, score, x1, y1, x2, y2)`. Slots beyond the
/// number of real detections stay all-zero; callers identify real rows by
/// `score > 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputTensor {
    batch: usize,
    keep_top_k: usize,
    data: Vec<f32>,
}

impl OutputTensor {
    fn zeros(batch: usize, keep_top_k: usize) -> Self {
        Self {
            batch,
            keep_top_k,
            data: vec![0.0; batch * keep_top_k * Detection::FIELDS],
        }
    }

    /// Number of images in the batch.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of detection slots per image.
    pub fn keep_top_k(&self) -> usize {
        self.keep_top_k
    }

    /// The whole buffer, row-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// All `keep_top_k * 7` values of one image, or `None` if out of range.
    pub fn image_rows(&self, image: usize) -> Option<&[f32]> {
        if image >= self.batch {
            return None;
        }
        let stride = self.keep_top_k * Detection::FIELDS;
        Some(&self.data[image * stride..(image + 1) * stride])
    }

    /// One 7-element detection row, or `None` if out of range.
    pub fn row(&self, image: usize, slot: usize) -> Option<&[f32]> {
        if slot >= self.keep_top_k {
            return None;
        }
        let rows = self.image_rows(image)?;
        Some(&rows[slot * Detection::FIELDS..(slot + 1) * Detection::FIELDS])
    }

    /// Number of real (non-zero-score) detections for one image.
    pub fn num_detections(&self, image: usize) -> Option<usize> {
        let rows = self.image_rows(image)?;
        Some(
            rows.chunks_exact(Detection::FIELDS)
                .take_while(|row| row[2] > 0.0)
                .count(),
        )
    }
}

/// Detection post-processing pipeline.
///
/// Owns the prior boxes and the validated configuration; both are immutable
/// for the detector's lifetime and shared read-only across batch images.
#[derive(Clone, Debug)]
pub struct Detector {
    config: DetectConfig,
    priors: Vec<PriorBox>,
}

impl Detector {
    /// Creates a detector, validating the configuration up front.
    ///
    /// A `Some(0)` per-class cap is normalized to "uncapped", matching the
    /// convention that a non-positive `nms_top_k` disables the cap.
    pub fn new(priors: Vec<PriorBox>, config: DetectConfig) -> DetPostResult<Self> {
        config.validate()?;
        if priors.is_empty() {
            return Err(DetPostError::EmptyPriors);
        }
        let mut config = config;
        config.nms_top_k = config.nms_top_k.filter(|&cap| cap > 0);
        Ok(Self { config, priors })
    }

    /// The validated configuration.
    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// Number of prior boxes.
    pub fn num_priors(&self) -> usize {
        self.priors.len()
    }

    /// Runs decode, per-class NMS and merging for a single image.
    ///
    /// `image_id` is carried into the output records verbatim; [`Detector::run`]
    /// passes 1-based identifiers. Returns at most `keep_top_k` detections in
    /// descending score order, never including the background label.
    pub fn detect_image(
        &self,
        offsets: &[LocOffset],
        scores: &ConfidenceMatrix,
        image_id: usize,
    ) -> DetPostResult<Vec<Detection>> {
        if scores.num_classes() != self.config.num_classes {
            return Err(DetPostError::ShapeMismatch {
                expected: self.config.num_classes,
                got: scores.num_classes(),
                context: "confidence classes",
            });
        }
        if scores.num_priors() != self.priors.len() {
            return Err(DetPostError::ShapeMismatch {
                expected: self.priors.len(),
                got: scores.num_priors(),
                context: "confidence priors",
            });
        }

        let _span = trace_span!("detect_image", image = image_id).entered();
        let decoded = decode(offsets, &self.priors, self.config.variance)?;

        let mut per_class: Vec<(usize, Vec<usize>)> =
            Vec::with_capacity(self.config.num_classes - 1);
        let mut eligible: Vec<usize> = Vec::new();
        for label in 0..self.config.num_classes {
            if label == self.config.background_label {
                continue;
            }
            let class_scores =
                scores
                    .class_scores(label)
                    .ok_or(DetPostError::IndexOutOfBounds {
                        index: label,
                        len: scores.num_classes(),
                        context: "classes",
                    })?;

            eligible.clear();
            eligible.extend(
                class_scores
                    .iter()
                    .enumerate()
                    .filter(|(_, &score)| score > self.config.conf_thresh)
                    .map(|(index, _)| index),
            );
            if eligible.is_empty() {
                continue;
            }

            let kept = nms_over(
                &decoded,
                class_scores,
                &eligible,
                self.config.nms_threshold,
                self.config.nms_top_k,
            )?;
            if !kept.is_empty() {
                per_class.push((label, kept));
            }
        }

        let detections = merge(
            &per_class,
            scores,
            &decoded,
            self.config.keep_top_k,
            image_id,
        )?;
        trace_event!("detections", image = image_id, count = detections.len());
        Ok(detections)
    }

    /// Processes a whole batch from flat tensors.
    ///
    /// `loc_data` has shape `[batch, num_priors, 4]` and `conf_data` has shape
    /// `[batch, num_priors, num_classes]` (or the transposed class-major
    /// layout, per `conf_layout`); both flattened row-major. The batch size is
    /// inferred from `loc_data` and cross-checked against `conf_data` before
    /// any image is processed.
    ///
    /// Every image in the batch is processed; image `i` owns the 1-based
    /// identifier `i + 1` and a disjoint row range of the output, so the
    /// parallel path needs no locking.
    pub fn run(&self, loc_data: &[f32], conf_data: &[f32]) -> DetPostResult<OutputTensor> {
        let num_priors = self.priors.len();
        let loc_stride = num_priors * 4;
        if loc_data.len() % loc_stride != 0 {
            return Err(DetPostError::BadLocLength {
                len: loc_data.len(),
                stride: loc_stride,
            });
        }
        let batch = loc_data.len() / loc_stride;
        let conf_stride = num_priors * self.config.num_classes;
        let expected_conf = batch * conf_stride;
        if conf_data.len() != expected_conf {
            return Err(DetPostError::BadConfLength {
                expected: expected_conf,
                got: conf_data.len(),
                batch,
            });
        }

        let _span = trace_span!("detect_batch", batch = batch).entered();
        let mut out = OutputTensor::zeros(batch, self.config.keep_top_k);
        let row_stride = self.config.keep_top_k * Detection::FIELDS;

        #[cfg(feature = "rayon")]
        if self.config.parallel {
            out.data
                .par_chunks_mut(row_stride)
                .enumerate()
                .try_for_each(|(image, rows)| {
                    self.detect_rows(
                        &loc_data[image * loc_stride..(image + 1) * loc_stride],
                        &conf_data[image * conf_stride..(image + 1) * conf_stride],
                        image + 1,
                        rows,
                    )
                })?;
            return Ok(out);
        }

        for (image, rows) in out.data.chunks_mut(row_stride).enumerate() {
            self.detect_rows(
                &loc_data[image * loc_stride..(image + 1) * loc_stride],
                &conf_data[image * conf_stride..(image + 1) * conf_stride],
                image + 1,
                rows,
            )?;
        }
        Ok(out)
    }

    /// Processes one image block and writes its detection rows.
    fn detect_rows(
        &self,
        loc_block: &[f32],
        conf_block: &[f32],
        image_id: usize,
        rows: &mut [f32],
    ) -> DetPostResult<()> {
        let offsets: Vec<LocOffset> = loc_block
            .chunks_exact(4)
            .map(LocOffset::from_chunk)
            .collect();
        let scores = ConfidenceMatrix::from_flat(
            conf_block,
            self.config.conf_layout,
            self.config.num_classes,
            self.priors.len(),
        )?;
        let detections = self.detect_image(&offsets, &scores, image_id)?;
        for (slot, detection) in rows
            .chunks_exact_mut(Detection::FIELDS)
            .zip(detections.iter())
        {
            detection.write_row(slot);
        }
        Ok(())
    }
}
