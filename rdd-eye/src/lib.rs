//! rdd-eye: road damage detection annotation pipeline
//!
//! Turns frames (single uploads or a live webcam feed) into annotated
//! frames plus a table of detected cracks and potholes. The model runtime,
//! the video transport and the UI are collaborators; this crate owns the
//! contract between them: resize, detect, postprocess, annotate, publish.

pub mod config;
pub mod error;
pub mod frame;
pub mod image_mode;
pub mod labels;
pub mod models;
pub mod processing;
pub mod stream;

pub use config::PipelineConfig;
pub use error::DetectionError;
pub use frame::Frame;
pub use labels::LabelSet;
pub use models::{Detection, Detector, DetectorCache, RawDetection, SharedDetector};
pub use stream::{ResultChannel, StreamCoordinator, StreamState, ThresholdController};
