//! Configuration for rdd-eye

use crate::error::DetectionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Identifier under which the road damage model is cached
pub const DEFAULT_CACHE_KEY: &str = "yolov8smallrdd";

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path to the pretrained weights
    pub model_path: PathBuf,
    /// Key the loaded detector is cached under
    pub cache_key: String,
    /// Model input geometry (width, height)
    pub input_size: (u32, u32),
    /// Confidence threshold applied until the user moves the slider
    pub default_threshold: f32,
    /// Slider granularity
    pub threshold_step: f32,
    /// How long a result consumer waits for the next batch
    pub result_wait_ms: u64,
    /// Largest accepted frame area in pixels
    pub max_frame_pixels: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/YOLOv8_Small_RDD.onnx"),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            input_size: (640, 640),
            default_threshold: 0.5,
            threshold_step: 0.05,
            result_wait_ms: 1000,
            max_frame_pixels: 7680 * 4320,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self, DetectionError> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&text)?;
        config.validate()?;
        info!("Loaded pipeline config from {:?}", path);
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), DetectionError> {
        let (w, h) = self.input_size;
        if w == 0 || h == 0 {
            return Err(DetectionError::Config("Input size must be non-zero".to_string()));
        }
        if w > 4096 || h > 4096 {
            return Err(DetectionError::Config("Input size too large (max 4096)".to_string()));
        }

        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(DetectionError::Config(
                "Default threshold must be within [0, 1]".to_string(),
            ));
        }

        if !(self.threshold_step > 0.0 && self.threshold_step <= 1.0) {
            return Err(DetectionError::Config(
                "Threshold step must be within (0, 1]".to_string(),
            ));
        }

        if self.result_wait_ms == 0 {
            return Err(DetectionError::Config("Result wait must be non-zero".to_string()));
        }

        if self.max_frame_pixels == 0 {
            return Err(DetectionError::Config("Max frame pixels must be non-zero".to_string()));
        }

        if self.cache_key.trim().is_empty() {
            return Err(DetectionError::Config("Cache key must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn result_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.result_wait_ms)
    }
}
