//! Detector boundary between the pipeline and the model runtime

use crate::error::DetectionError;
use crate::frame::Frame;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One row of raw model output, in model-input pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    /// Class index as emitted by the model; may be out of range
    pub class_id: i64,
    pub confidence: f32,
    /// xmin, ymin, xmax, ymax
    pub bbox: [f32; 4],
}

impl RawDetection {
    pub fn new(class_id: i64, confidence: f32, bbox: [f32; 4]) -> Self {
        Self { class_id, confidence, bbox }
    }
}

/// Classified, scored, localized damage instance in original-frame pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub score: f32,
    /// xmin, ymin, xmax, ymax
    #[serde(rename = "box")]
    pub bbox: [u32; 4],
}

/// Object detector wrapping a pretrained model.
///
/// Implementations are not assumed reentrant; callers serialize access
/// through [`SharedDetector`].
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send {
    /// Run inference on a frame already resized to [`Detector::input_size`].
    ///
    /// `threshold` may be used to skip low-confidence rows early; the
    /// postprocessor filters again and is authoritative.
    fn detect(&mut self, frame: &Frame, threshold: f32) -> Result<Vec<RawDetection>, DetectionError>;

    /// Geometry the model expects (width, height)
    fn input_size(&self) -> (u32, u32);

    fn name(&self) -> &str;
}

/// A detector guarded so only one inference runs at a time
pub type SharedDetector = Arc<Mutex<dyn Detector>>;

pub fn share<D: Detector + 'static>(detector: D) -> SharedDetector {
    Arc::new(Mutex::new(detector))
}

/// Load pretrained weights through the model runtime
pub fn load_model(path: &Path, input_size: (u32, u32)) -> Result<SharedDetector, DetectionError> {
    if !path.is_file() {
        return Err(DetectionError::ModelLoad(format!(
            "Model weights not found at {:?}",
            path
        )));
    }

    info!("Loading detector from {:?}", path);
    load_runtime(path, input_size)
}

#[cfg(feature = "onnx")]
fn load_runtime(path: &Path, input_size: (u32, u32)) -> Result<SharedDetector, DetectionError> {
    let detector = super::yolo::YoloDetector::load(path, input_size)?;
    Ok(share(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_runtime(path: &Path, _input_size: (u32, u32)) -> Result<SharedDetector, DetectionError> {
    Err(DetectionError::ModelLoad(format!(
        "No model runtime compiled in (enable the `onnx` feature) for {:?}",
        path
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_model_missing_weights() {
        let result = load_model(Path::new("/nonexistent/YOLOv8_Small_RDD.onnx"), (640, 640));
        match result {
            Err(DetectionError::ModelLoad(msg)) => assert!(msg.contains("not found")),
            _ => panic!("Expected ModelLoad error"),
        }
    }

    #[test]
    fn test_detection_serializes_box_field() {
        let det = Detection {
            class_id: 3,
            label: "Potholes".to_string(),
            score: 0.75,
            bbox: [1, 2, 3, 4],
        };
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["box"], serde_json::json!([1, 2, 3, 4]));
        assert_eq!(json["label"], "Potholes");
    }

    #[test]
    fn test_shared_detector_serializes_calls() {
        let mut mock = MockDetector::new();
        mock.expect_detect().times(2).returning(|_, _| Ok(vec![]));
        mock.expect_input_size().return_const((640u32, 640u32));

        let shared = share(mock);
        let frame = Frame::from_rgb8(1, 1, vec![0, 0, 0]).unwrap();
        for _ in 0..2 {
            let rows = shared.lock().detect(&frame, 0.5).unwrap();
            assert!(rows.is_empty());
        }
        assert_eq!(shared.lock().input_size(), (640, 640));
    }
}
