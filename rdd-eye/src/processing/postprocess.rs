//! Raw model output to domain detections

use crate::labels::LabelSet;
use crate::models::{Detection, RawDetection};
use crate::processing::preprocess::FrameGeometry;
use tracing::{debug, warn};

/// Map raw rows to detections in original-frame pixels.
///
/// Rows below `threshold` are dropped, as are rows whose class index falls
/// outside `labels` or whose box is not finite. Boxes are scaled per axis
/// from resized to original space, truncated to whole pixels and clamped
/// to `[0, dim)`. Scores are clamped into `[0, 1]`. Output keeps the
/// relative order of `raw`.
pub fn postprocess(
    raw: &[RawDetection],
    geometry: &FrameGeometry,
    threshold: f32,
    labels: &LabelSet,
) -> Vec<Detection> {
    let (scale_x, scale_y) = geometry.scale();
    let max_x = geometry.original_width.saturating_sub(1) as f32;
    let max_y = geometry.original_height.saturating_sub(1) as f32;

    let mut detections = Vec::with_capacity(raw.len());
    for (index, row) in raw.iter().enumerate() {
        // NaN never passes
        if !(row.confidence >= threshold) {
            continue;
        }

        let (class_id, label) = match labels.resolve(row.class_id) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Dropping row {}: {}", index, e);
                continue;
            }
        };

        if row.bbox.iter().any(|v| !v.is_finite()) {
            warn!("Dropping row {}: non-finite box {:?}", index, row.bbox);
            continue;
        }

        let [x0, y0, x1, y1] = row.bbox;
        let rescale = |v: f32, scale: f32, max: f32| (v * scale).floor().clamp(0.0, max) as u32;
        let xa = rescale(x0, scale_x, max_x);
        let xb = rescale(x1, scale_x, max_x);
        let ya = rescale(y0, scale_y, max_y);
        let yb = rescale(y1, scale_y, max_y);

        detections.push(Detection {
            class_id,
            label: label.to_string(),
            score: row.confidence.clamp(0.0, 1.0),
            bbox: [xa.min(xb), ya.min(yb), xa.max(xb), ya.max(yb)],
        });
    }

    debug!(
        "Postprocessed {} raw rows into {} detections at threshold {:.2}",
        raw.len(),
        detections.len(),
        threshold
    );
    detections
}
