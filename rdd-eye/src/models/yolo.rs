//! YOLOv8 road damage detector on ONNX Runtime

use crate::error::DetectionError;
use crate::frame::Frame;
use crate::models::detector::{Detector, RawDetection};
use ndarray::{Array4, ArrayViewD};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::path::Path;
use tracing::{debug, info};

/// IoU above which overlapping boxes of the same class are suppressed
const NMS_IOU_THRESHOLD: f32 = 0.7;
/// Upper bound on rows returned per frame
const MAX_DETECTIONS: usize = 300;

/// YOLOv8 model exported to ONNX
pub struct YoloDetector {
    session: Session,
    input_size: (u32, u32),
}

impl YoloDetector {
    /// Load weights and build an inference session
    pub fn load(model_path: &Path, input_size: (u32, u32)) -> Result<Self, DetectionError> {
        let session = Session::builder()
            .map_err(|e| DetectionError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectionError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| DetectionError::ModelLoad(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?}", model_path);

        Ok(Self { session, input_size })
    }

    /// Normalized NCHW tensor of a frame already at model geometry
    fn to_tensor(&self, frame: &Frame) -> Result<Array4<f32>, DetectionError> {
        let (w, h) = self.input_size;
        if frame.dimensions() != self.input_size {
            return Err(DetectionError::InvalidFrame(format!(
                "Detector expects {}x{}, got {}x{}",
                w,
                h,
                frame.width(),
                frame.height()
            )));
        }

        let mut input = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
        for (x, y, pixel) in frame.as_image().enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }
        Ok(input)
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame, threshold: f32) -> Result<Vec<RawDetection>, DetectionError> {
        let input = self.to_tensor(frame)?.into_dyn();
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectionError::Inference(format!("YOLO inference failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Inference(format!("Failed to extract output tensor: {}", e)))?
            .into_owned();
        drop(outputs);

        let rows = decode(output.view(), threshold)?;
        debug!("YOLO produced {} rows", rows.len());
        Ok(rows)
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn name(&self) -> &str {
        "YOLOv8"
    }
}

/// Decode `[1, 4 + classes, anchors]` output into boxes, in anchor order
/// before NMS
fn decode(output: ArrayViewD<'_, f32>, threshold: f32) -> Result<Vec<RawDetection>, DetectionError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        return Err(DetectionError::Inference(format!(
            "Unexpected output shape: {:?}",
            shape
        )));
    }

    let num_classes = shape[1] - 4;
    let num_anchors = shape[2];
    let mut rows = Vec::new();

    for i in 0..num_anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::MIN;
        for c in 0..num_classes {
            let score = output[[0, 4 + c, i]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if !best_score.is_finite() || best_score < threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let bw = output[[0, 2, i]];
        let bh = output[[0, 3, i]];

        rows.push(RawDetection::new(
            best_class as i64,
            best_score,
            [cx - bw / 2.0, cy - bh / 2.0, cx + bw / 2.0, cy + bh / 2.0],
        ));
    }

    Ok(non_max_suppression(rows, NMS_IOU_THRESHOLD, MAX_DETECTIONS))
}

/// Class-aware NMS. Survivors are ordered by descending confidence; rows
/// with equal confidence keep their input order, which for decoded output
/// is ascending anchor index.
fn non_max_suppression(mut rows: Vec<RawDetection>, iou_threshold: f32, limit: usize) -> Vec<RawDetection> {
    rows.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for row in rows {
        if keep.len() >= limit {
            break;
        }
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == row.class_id && iou(&k.bbox, &row.bbox) > iou_threshold);
        if !overlaps {
            keep.push(row);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 || !union.is_finite() {
        0.0
    } else {
        inter / union
    }
}
