//! Per-image confidence scores in class-major layout.

use crate::util::{DetPostError, DetPostResult};

/// Memory layout of a flat confidence tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConfLayout {
    /// `[num_priors, num_classes]`: one row of class scores per prior.
    ///
    /// This is the layout most detection heads emit; it is transposed on
    /// ingestion.
    #[default]
    PriorMajor,
    /// `[num_classes, num_priors]`: one row of prior scores per class.
    ClassMajor,
}

/// Per-image score matrix of shape `[num_classes, num_priors]`.
///
/// Scores are stored class-major so that a class's score vector is one
/// contiguous slice, which is what the suppression loop consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfidenceMatrix {
    num_classes: usize,
    num_priors: usize,
    data: Vec<f32>,
}

impl ConfidenceMatrix {
    /// Builds a matrix from class-major data (`[num_classes, num_priors]`).
    pub fn from_class_major(
        data: Vec<f32>,
        num_classes: usize,
        num_priors: usize,
    ) -> DetPostResult<Self> {
        let expected = num_classes * num_priors;
        if data.len() != expected {
            return Err(DetPostError::ShapeMismatch {
                expected,
                got: data.len(),
                context: "confidence matrix",
            });
        }
        Ok(Self {
            num_classes,
            num_priors,
            data,
        })
    }

    /// Builds a matrix from prior-major data (`[num_priors, num_classes]`),
    /// transposing into class-major storage.
    pub fn from_prior_major(
        data: &[f32],
        num_classes: usize,
        num_priors: usize,
    ) -> DetPostResult<Self> {
        let expected = num_classes * num_priors;
        if data.len() != expected {
            return Err(DetPostError::ShapeMismatch {
                expected,
                got: data.len(),
                context: "confidence matrix",
            });
        }
        let mut transposed = vec![0.0f32; expected];
        for prior in 0..num_priors {
            let row = &data[prior * num_classes..(prior + 1) * num_classes];
            for (class, &score) in row.iter().enumerate() {
                transposed[class * num_priors + prior] = score;
            }
        }
        Ok(Self {
            num_classes,
            num_priors,
            data: transposed,
        })
    }

    /// Builds a matrix from a flat slice in the given layout.
    pub fn from_flat(
        data: &[f32],
        layout: ConfLayout,
        num_classes: usize,
        num_priors: usize,
    ) -> DetPostResult<Self> {
        match layout {
            ConfLayout::PriorMajor => Self::from_prior_major(data, num_classes, num_priors),
            ConfLayout::ClassMajor => Self::from_class_major(data.to_vec(), num_classes, num_priors),
        }
    }

    /// Number of classes, including background.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of priors (one score per prior per class).
    pub fn num_priors(&self) -> usize {
        self.num_priors
    }

    /// Score vector for one class, or `None` if the label is out of range.
    pub fn class_scores(&self, label: usize) -> Option<&[f32]> {
        if label >= self.num_classes {
            return None;
        }
        Some(&self.data[label * self.num_priors..(label + 1) * self.num_priors])
    }
}
