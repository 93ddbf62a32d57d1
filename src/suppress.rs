//! Greedy non-maximum suppression over decoded boxes.

use crate::boxes::CornerBox;
use crate::util::{DetPostError, DetPostResult};

/// Applies greedy NMS over all boxes of one class.
///
/// Candidate indices are visited in descending score order (ties broken by
/// lower original index) and a candidate is kept if its IoU with every
/// previously kept box is below `threshold`. An IoU exactly equal to the
/// threshold suppresses. `cap` limits the number of survivors.
///
/// Returns surviving indices into `boxes`, in descending score order.
pub fn nms(
    boxes: &[CornerBox],
    scores: &[f32],
    threshold: f32,
    cap: Option<usize>,
) -> DetPostResult<Vec<usize>> {
    if boxes.len() != scores.len() {
        return Err(DetPostError::ScoreCountMismatch {
            boxes: boxes.len(),
            scores: scores.len(),
        });
    }
    let order: Vec<usize> = (0..boxes.len()).collect();
    nms_ordered(boxes, scores, order, threshold, cap)
}

/// Applies greedy NMS over a pre-filtered candidate index list.
///
/// Identical suppression semantics to [`nms`], restricted to the indices in
/// `eligible`. The pipeline uses this after its confidence pre-filter so
/// below-threshold boxes never enter the sort.
pub fn nms_over(
    boxes: &[CornerBox],
    scores: &[f32],
    eligible: &[usize],
    threshold: f32,
    cap: Option<usize>,
) -> DetPostResult<Vec<usize>> {
    if boxes.len() != scores.len() {
        return Err(DetPostError::ScoreCountMismatch {
            boxes: boxes.len(),
            scores: scores.len(),
        });
    }
    for &index in eligible {
        if index >= boxes.len() {
            return Err(DetPostError::IndexOutOfBounds {
                index,
                len: boxes.len(),
                context: "boxes",
            });
        }
    }
    nms_ordered(boxes, scores, eligible.to_vec(), threshold, cap)
}

fn nms_ordered(
    boxes: &[CornerBox],
    scores: &[f32],
    mut order: Vec<usize>,
    threshold: f32,
    cap: Option<usize>,
) -> DetPostResult<Vec<usize>> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(DetPostError::InvalidNmsThreshold { value: threshold });
    }
    let cap = cap.unwrap_or(usize::MAX);
    if cap == 0 || order.is_empty() {
        return Ok(Vec::new());
    }

    // total_cmp keeps the order defined even for pathological score values.
    order.sort_unstable_by(|&a, &b| scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b)));

    let mut kept: Vec<usize> = Vec::new();
    'outer: for &index in order.iter() {
        if kept.len() == cap {
            break;
        }
        for &survivor in kept.iter() {
            if boxes[survivor].iou(&boxes[index]) >= threshold {
                continue 'outer;
            }
        }
        kept.push(index);
    }

    Ok(kept)
}
