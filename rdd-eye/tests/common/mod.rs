//! Shared test doubles for rdd-eye integration tests

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use rdd_eye::error::DetectionError;
use rdd_eye::{Detector, Frame, RawDetection};
use std::collections::VecDeque;
use std::sync::Arc;

type Hook = Box<dyn FnMut(usize) + Send>;

/// Detector that replays one scripted output per call and records the
/// thresholds it was called with.
pub struct ScriptedDetector {
    outputs: VecDeque<Result<Vec<RawDetection>, DetectionError>>,
    seen_thresholds: Arc<Mutex<Vec<f32>>>,
    calls: usize,
    during_detect: Option<Hook>,
}

impl ScriptedDetector {
    pub fn new(outputs: Vec<Vec<RawDetection>>) -> Self {
        Self {
            outputs: outputs.into_iter().map(Ok).collect(),
            seen_thresholds: Arc::new(Mutex::new(Vec::new())),
            calls: 0,
            during_detect: None,
        }
    }

    pub fn with_results(outputs: Vec<Result<Vec<RawDetection>, DetectionError>>) -> Self {
        let mut detector = Self::new(vec![]);
        detector.outputs = outputs.into_iter().collect();
        detector
    }

    /// Run `hook(call_index)` while inference is in flight
    pub fn during_detect(mut self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        self.during_detect = Some(Box::new(hook));
        self
    }

    pub fn thresholds(&self) -> Arc<Mutex<Vec<f32>>> {
        self.seen_thresholds.clone()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame, threshold: f32) -> Result<Vec<RawDetection>, DetectionError> {
        assert_eq!(frame.dimensions(), (640, 640), "detector fed unresized frame");
        self.seen_thresholds.lock().push(threshold);
        if let Some(hook) = self.during_detect.as_mut() {
            hook(self.calls);
        }
        self.calls += 1;
        self.outputs.pop_front().unwrap_or_else(|| Ok(vec![]))
    }

    fn input_size(&self) -> (u32, u32) {
        (640, 640)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn road_frame(width: u32, height: u32) -> Frame {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 251) as u8, (y % 241) as u8, 60]));
    Frame::new(img).unwrap()
}

pub fn pothole(confidence: f32, bbox: [f32; 4]) -> RawDetection {
    RawDetection::new(3, confidence, bbox)
}
