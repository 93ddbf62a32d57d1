//! Decoding of predicted offsets against prior boxes.

use crate::boxes::{CornerBox, LocOffset, PriorBox, Variance};
use crate::util::{DetPostError, DetPostResult};

/// Decodes predicted offsets into absolute corner boxes.
///
/// Per index `i` the decoded center is
/// `cx' = prior.cx + dx * variance.cx * prior.w` (and likewise for `cy'`),
/// the decoded size is `w' = prior.w * exp(dw * variance.w)` (and likewise
/// for `h'`), converted to corner form. Output order matches input order.
///
/// A length mismatch between `offsets` and `priors` is a caller bug and is
/// reported as [`DetPostError::PriorCountMismatch`].
pub fn decode(
    offsets: &[LocOffset],
    priors: &[PriorBox],
    variance: Variance,
) -> DetPostResult<Vec<CornerBox>> {
    let mut out = Vec::new();
    decode_into(offsets, priors, variance, &mut out)?;
    Ok(out)
}

/// Decodes into a caller-owned buffer, reusing its allocation.
///
/// The buffer is cleared first. The batch loop uses this to keep one scratch
/// vector alive across images.
pub fn decode_into(
    offsets: &[LocOffset],
    priors: &[PriorBox],
    variance: Variance,
    out: &mut Vec<CornerBox>,
) -> DetPostResult<()> {
    if offsets.len() != priors.len() {
        return Err(DetPostError::PriorCountMismatch {
            offsets: offsets.len(),
            priors: priors.len(),
        });
    }

    out.clear();
    out.reserve(priors.len());
    for (offset, prior) in offsets.iter().zip(priors.iter()) {
        let cx = prior.cx + offset.dx * variance.cx * prior.w;
        let cy = prior.cy + offset.dy * variance.cy * prior.h;
        let w = prior.w * (offset.dw * variance.w).exp();
        let h = prior.h * (offset.dh * variance.h).exp();
        out.push(CornerBox::from_center(cx, cy, w, h));
    }
    Ok(())
}
