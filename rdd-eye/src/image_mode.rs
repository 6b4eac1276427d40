//! Single-image detection for uploads
//!
//! Unlike streaming, errors here go straight back to the caller: there is
//! no ongoing session to protect.

use crate::config::PipelineConfig;
use crate::error::DetectionError;
use crate::frame::{export_png, Frame, EXPORT_FILE_NAME, EXPORT_MIME};
use crate::labels::LabelSet;
use crate::models::{Detection, SharedDetector};
use crate::processing::{annotate, detect_frame};
use tracing::info;

/// Outcome of detecting damage in one image
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub original: Frame,
    pub annotated: Frame,
    pub detections: Vec<Detection>,
    pub threshold: f32,
}

/// Downloadable prediction image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    pub file_name: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ImageReport {
    /// Encode the annotated frame for download
    pub fn export(&self) -> Result<ExportedImage, DetectionError> {
        Ok(ExportedImage {
            file_name: EXPORT_FILE_NAME,
            mime: EXPORT_MIME,
            bytes: export_png(&self.annotated)?,
        })
    }
}

/// Runs the pipeline once per uploaded image
pub struct ImageDetector {
    detector: SharedDetector,
    labels: LabelSet,
    max_frame_pixels: u64,
}

impl ImageDetector {
    pub fn new(detector: SharedDetector, config: &PipelineConfig) -> Self {
        Self {
            detector,
            labels: LabelSet::road_damage(),
            max_frame_pixels: config.max_frame_pixels,
        }
    }

    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    /// Decode an uploaded PNG/JPEG and detect damage in it
    pub fn detect_upload(&self, upload: &[u8], threshold: f32) -> Result<ImageReport, DetectionError> {
        let frame = Frame::decode(upload)?;
        self.detect(frame, threshold)
    }

    pub fn detect(&self, frame: Frame, threshold: f32) -> Result<ImageReport, DetectionError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DetectionError::Config(format!(
                "Threshold {} outside [0, 1]",
                threshold
            )));
        }

        let detections = detect_frame(&self.detector, &self.labels, &frame, threshold, self.max_frame_pixels)?;
        let annotated = annotate(&frame, &detections);
        info!(
            "Image {}x{}: {} detections at {:.2}",
            frame.width(),
            frame.height(),
            detections.len(),
            threshold
        );

        Ok(ImageReport {
            original: frame,
            annotated,
            detections,
            threshold,
        })
    }
}
