//! Cross-class merging of per-class NMS survivors.

use std::cmp::Ordering;

use crate::boxes::CornerBox;
use crate::scores::ConfidenceMatrix;
use crate::util::{DetPostError, DetPostResult};

/// Per-class NMS survivor waiting to be globally ranked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Index into the decoded box list.
    pub index: usize,
    /// Class label.
    pub label: usize,
    /// Confidence score for `(label, index)`.
    pub score: f32,
}

fn candidate_cmp_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.label.cmp(&b.label))
        .then_with(|| a.index.cmp(&b.index))
}

/// Final detection record for one box in one image.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Detection {
    /// 1-based image identifier within the batch.
    pub image_id: usize,
    /// Class label.
    pub label: usize,
    /// Confidence score.
    pub score: f32,
    /// Decoded box in corner form.
    pub bbox: CornerBox,
}

impl Detection {
    /// Number of output fields per detection row:
    /// `(image_id, label, score, x1, y1, x2, y2)`.
    pub const FIELDS: usize = 7;

    /// Writes this detection into a 7-element output row.
    pub(crate) fn write_row(&self, row: &mut [f32]) {
        row[0] = self.image_id as f32;
        row[1] = self.label as f32;
        row[2] = self.score;
        row[3] = self.bbox.x1;
        row[4] = self.bbox.y1;
        row[5] = self.bbox.x2;
        row[6] = self.bbox.y2;
    }
}

/// Merges per-class survivor index lists into one globally ranked detection
/// list for a single image.
///
/// `per_class` holds `(label, indices)` pairs; the caller is expected to have
/// excluded the background label already. The pooled candidates are sorted by
/// descending score with deterministic tie-breaking (ascending label, then
/// ascending index) and truncated to `keep_top_k`.
pub fn merge(
    per_class: &[(usize, Vec<usize>)],
    scores: &ConfidenceMatrix,
    decoded: &[CornerBox],
    keep_top_k: usize,
    image_id: usize,
) -> DetPostResult<Vec<Detection>> {
    if decoded.len() != scores.num_priors() {
        return Err(DetPostError::ShapeMismatch {
            expected: scores.num_priors(),
            got: decoded.len(),
            context: "decoded boxes",
        });
    }

    let mut pool: Vec<Candidate> = Vec::new();
    for (label, indices) in per_class.iter() {
        let class_scores =
            scores
                .class_scores(*label)
                .ok_or(DetPostError::IndexOutOfBounds {
                    index: *label,
                    len: scores.num_classes(),
                    context: "classes",
                })?;
        for &index in indices.iter() {
            if index >= decoded.len() {
                return Err(DetPostError::IndexOutOfBounds {
                    index,
                    len: decoded.len(),
                    context: "decoded boxes",
                });
            }
            pool.push(Candidate {
                index,
                label: *label,
                score: class_scores[index],
            });
        }
    }

    pool.sort_unstable_by(candidate_cmp_desc);
    pool.truncate(keep_top_k);

    Ok(pool
        .into_iter()
        .map(|candidate| Detection {
            image_id,
            label: candidate.label,
            score: candidate.score,
            bbox: decoded[candidate.index],
        })
        .collect())
}
