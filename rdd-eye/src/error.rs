//! Error types for rdd-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Class index {class_id} outside label set of {label_count} entries")]
    OutOfRangeClass { class_id: i64, label_count: usize },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DetectionError {
    /// Errors after which a detector must not be asked again
    pub fn is_fatal(&self) -> bool {
        matches!(self, DetectionError::ModelLoad(_))
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_error_display() {
        let err = DetectionError::InvalidFrame("zero width".to_string());
        assert!(err.to_string().contains("Invalid frame"));
        assert!(err.to_string().contains("zero width"));
    }

    #[test]
    fn test_out_of_range_display() {
        let err = DetectionError::OutOfRangeClass { class_id: 7, label_count: 4 };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_detection_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "weights missing");
        let err: DetectionError = io_err.into();
        match err {
            DetectionError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_only_model_load_is_fatal() {
        assert!(DetectionError::ModelLoad("gone".to_string()).is_fatal());
        assert!(!DetectionError::InvalidFrame("bad".to_string()).is_fatal());
        assert!(!DetectionError::Inference("oops".to_string()).is_fatal());
        assert!(!DetectionError::OutOfRangeClass { class_id: -1, label_count: 4 }.is_fatal());
    }
}
