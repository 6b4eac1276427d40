//! Shared confidence threshold

use crate::error::DetectionError;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Single confidence threshold written by the UI and read once per frame.
///
/// The `f32` is stored as its bit pattern so reads and writes are single
/// atomic operations; `set` publishes with `Release`, `get` reads with
/// `Acquire`.
#[derive(Debug)]
pub struct ThresholdController {
    bits: AtomicU32,
}

impl ThresholdController {
    /// Create a controller, clamping `initial` into [0, 1]
    pub fn new(initial: f32) -> Self {
        let initial = if initial.is_nan() { 0.5 } else { initial.clamp(0.0, 1.0) };
        Self {
            bits: AtomicU32::new(initial.to_bits()),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Store a new threshold, clamped into [0, 1]. Returns the value that
    /// was stored. NaN is rejected and the previous value is kept.
    pub fn set(&self, value: f32) -> Result<f32, DetectionError> {
        if value.is_nan() {
            return Err(DetectionError::Config("Threshold must be a number".to_string()));
        }
        let value = value.clamp(0.0, 1.0);
        self.bits.store(value.to_bits(), Ordering::Release);
        debug!("Confidence threshold set to {:.2}", value);
        Ok(value)
    }
}

impl Default for ThresholdController {
    fn default() -> Self {
        Self::new(0.5)
    }
}
