//! Detector capability, detection values and model lifecycle

pub mod cache;
pub mod detector;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use cache::DetectorCache;
pub use detector::{load_model, share, Detection, Detector, RawDetection, SharedDetector};
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;
