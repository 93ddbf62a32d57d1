//! Box geometry: prior boxes, predicted offsets and decoded corner boxes.

use crate::util::{DetPostError, DetPostResult};

/// Fixed reference box in center-size form, shared read-only across a batch.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriorBox {
    /// Center x coordinate.
    pub cx: f32,
    /// Center y coordinate.
    pub cy: f32,
    /// Box width.
    pub w: f32,
    /// Box height.
    pub h: f32,
}

/// Predicted per-prior location offset `(dx, dy, dw, dh)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocOffset {
    /// Center x offset, relative to the prior width.
    pub dx: f32,
    /// Center y offset, relative to the prior height.
    pub dy: f32,
    /// Log-space width scale.
    pub dw: f32,
    /// Log-space height scale.
    pub dh: f32,
}

impl LocOffset {
    /// Reads one offset from a 4-element slice `[dx, dy, dw, dh]`.
    ///
    /// Used when slicing per-image blocks out of a flat location tensor.
    pub(crate) fn from_chunk(chunk: &[f32]) -> Self {
        Self {
            dx: chunk[0],
            dy: chunk[1],
            dw: chunk[2],
            dh: chunk[3],
        }
    }
}

/// Offset rescaling constants applied before decoding.
///
/// All four components must be strictly positive. The default matches the
/// SSD convention of `(0.1, 0.1, 0.2, 0.2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variance {
    /// Scale for the center x offset.
    pub cx: f32,
    /// Scale for the center y offset.
    pub cy: f32,
    /// Scale for the log-width offset.
    pub w: f32,
    /// Scale for the log-height offset.
    pub h: f32,
}

impl Default for Variance {
    fn default() -> Self {
        Self {
            cx: 0.1,
            cy: 0.1,
            w: 0.2,
            h: 0.2,
        }
    }
}

impl Variance {
    /// Creates a validated variance vector.
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> DetPostResult<Self> {
        let variance = Self { cx, cy, w, h };
        variance.validate()?;
        Ok(variance)
    }

    /// Rejects non-positive or non-finite components.
    pub fn validate(&self) -> DetPostResult<()> {
        for value in [self.cx, self.cy, self.w, self.h] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(DetPostError::InvalidVariance { value });
            }
        }
        Ok(())
    }
}

/// Absolute box in corner form `(x1, y1, x2, y2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CornerBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl CornerBox {
    /// Builds a corner box from center-size form.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w * 0.5,
            y1: cy - h * 0.5,
            x2: cx + w * 0.5,
            y2: cy + h * 0.5,
        }
    }

    /// Box area, clamped at zero for degenerate boxes.
    pub fn area(&self) -> f32 {
        let w = (self.x2 - self.x1).max(0.0);
        let h = (self.y2 - self.y1).max(0.0);
        w * h
    }

    /// Intersection over union with another box.
    ///
    /// Zero-area boxes have IoU 0 against any other box.
    pub fn iou(&self, other: &CornerBox) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = inter_w * inter_h;
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}
