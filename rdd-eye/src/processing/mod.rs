//! Per-frame processing stages

pub mod annotate;
mod font;
pub mod postprocess;
pub mod preprocess;

pub use annotate::annotate;
pub use postprocess::postprocess;
pub use preprocess::{resize, FrameGeometry, Resized};

use crate::error::DetectionError;
use crate::frame::Frame;
use crate::labels::LabelSet;
use crate::models::{Detection, SharedDetector};
use tracing::debug;

/// Resize, detect and postprocess one frame with a single threshold
/// snapshot. Holds the detector lock only for the inference call.
pub fn detect_frame(
    detector: &SharedDetector,
    labels: &LabelSet,
    frame: &Frame,
    threshold: f32,
    max_frame_pixels: u64,
) -> Result<Vec<Detection>, DetectionError> {
    if frame.pixel_count() > max_frame_pixels {
        return Err(DetectionError::InvalidFrame(format!(
            "Frame {}x{} exceeds {} pixels",
            frame.width(),
            frame.height(),
            max_frame_pixels
        )));
    }

    let (input_w, input_h) = detector.lock().input_size();
    let resized = resize(frame, input_w, input_h)?;

    let raw = {
        let mut guard = detector.lock();
        debug!("Running {} on {}x{} input", guard.name(), input_w, input_h);
        guard.detect(&resized.frame, threshold)?
    };

    Ok(postprocess(&raw, &resized.geometry, threshold, labels))
}
