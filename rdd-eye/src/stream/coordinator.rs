//! Stream coordinator: per-frame pipeline for continuous input

use crate::config::PipelineConfig;
use crate::error::DetectionError;
use crate::frame::Frame;
use crate::labels::LabelSet;
use crate::models::SharedDetector;
use crate::processing::{annotate, detect_frame};
use crate::stream::channel::{ResultBatch, ResultChannel, ResultReceiver};
use crate::stream::threshold::ThresholdController;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    /// The detector failed unrecoverably; frames pass through untouched
    Failed,
}

/// Where frames come from, e.g. a webcam transport
pub trait FrameSource {
    /// Block until the next frame is available. `None` ends the stream.
    fn next_frame(&mut self) -> Option<Result<Frame, DetectionError>>;
}

impl<I> FrameSource for I
where
    I: Iterator<Item = Result<Frame, DetectionError>>,
{
    fn next_frame(&mut self) -> Option<Result<Frame, DetectionError>> {
        self.next()
    }
}

/// Where processed frames go back to for display
pub trait FrameSink {
    fn deliver(&mut self, frame: Frame) -> Result<(), DetectionError>;
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) -> Result<(), DetectionError>,
{
    fn deliver(&mut self, frame: Frame) -> Result<(), DetectionError> {
        self(frame)
    }
}

/// Counters for one coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_annotated: u64,
    pub frames_passed_through: u64,
    pub source_errors: u64,
}

/// Runs preprocess → detect → postprocess → publish → annotate for each
/// frame while streaming. A failing frame is logged and returned
/// unannotated; it never stops the feed.
pub struct StreamCoordinator {
    detector: SharedDetector,
    labels: LabelSet,
    threshold: Arc<ThresholdController>,
    results: ResultChannel,
    max_frame_pixels: u64,
    state: RwLock<StreamState>,
    stop_requested: AtomicBool,
    next_index: AtomicU64,
    annotated: AtomicU64,
    passed_through: AtomicU64,
    source_errors: AtomicU64,
}

impl StreamCoordinator {
    pub fn new(detector: SharedDetector, threshold: Arc<ThresholdController>, config: &PipelineConfig) -> Self {
        Self {
            detector,
            labels: LabelSet::road_damage(),
            threshold,
            results: ResultChannel::new(),
            max_frame_pixels: config.max_frame_pixels,
            state: RwLock::new(StreamState::Idle),
            stop_requested: AtomicBool::new(false),
            next_index: AtomicU64::new(0),
            annotated: AtomicU64::new(0),
            passed_through: AtomicU64::new(0),
            source_errors: AtomicU64::new(0),
        }
    }

    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    pub fn threshold(&self) -> &Arc<ThresholdController> {
        &self.threshold
    }

    /// Subscribe a consumer to per-frame result batches
    pub fn subscribe(&self) -> ResultReceiver {
        self.results.subscribe()
    }

    pub fn results(&self) -> &ResultChannel {
        &self.results
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            frames_annotated: self.annotated.load(Ordering::Relaxed),
            frames_passed_through: self.passed_through.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
        }
    }

    /// Idle → Streaming. A failed coordinator cannot be restarted.
    ///
    /// An explicit start discards any stop request still pending.
    pub fn start(&self) -> Result<(), DetectionError> {
        self.stop_requested.store(false, Ordering::Release);
        self.begin()
    }

    fn begin(&self) -> Result<(), DetectionError> {
        let mut state = self.state.write();
        match *state {
            StreamState::Failed => Err(DetectionError::ModelLoad(
                "Stream detector failed; reload the model and create a new stream".to_string(),
            )),
            StreamState::Streaming => Ok(()),
            StreamState::Idle => {
                *state = StreamState::Streaming;
                info!("Stream started");
                Ok(())
            }
        }
    }

    /// Streaming → Idle. A [`StreamCoordinator::run`] loop in progress, or
    /// the next one to begin, finishes the frame in flight and returns.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.finish();
    }

    fn finish(&self) {
        let mut state = self.state.write();
        if *state == StreamState::Streaming {
            *state = StreamState::Idle;
            info!("Stream stopped");
        }
    }

    /// Process one frame and return what the transport should display.
    ///
    /// Outside `Streaming` the frame is returned as is.
    pub fn process(&self, frame: Frame) -> Frame {
        if self.state() != StreamState::Streaming {
            self.passed_through.fetch_add(1, Ordering::Relaxed);
            return frame;
        }

        self.run_pipeline(frame)
    }

    /// Full pipeline for one frame, whatever the current state. A fatal
    /// error moves the coordinator to `Failed`.
    fn run_pipeline(&self, frame: Frame) -> Frame {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        match self.process_streaming(&frame, index) {
            Ok(annotated) => {
                self.annotated.fetch_add(1, Ordering::Relaxed);
                annotated
            }
            Err(e) if e.is_fatal() => {
                error!("Detector failed on frame {}: {}", index, e);
                *self.state.write() = StreamState::Failed;
                self.passed_through.fetch_add(1, Ordering::Relaxed);
                frame
            }
            Err(e) => {
                warn!("Passing frame {} through unannotated: {}", index, e);
                self.passed_through.fetch_add(1, Ordering::Relaxed);
                frame
            }
        }
    }

    fn process_streaming(&self, frame: &Frame, index: u64) -> Result<Frame, DetectionError> {
        // One snapshot per frame; a concurrent set applies from the next frame
        let threshold = self.threshold.get();

        let detections = detect_frame(&self.detector, &self.labels, frame, threshold, self.max_frame_pixels)?;
        debug!("Frame {}: {} detections at {:.2}", index, detections.len(), threshold);

        let batch = self.results.publish(ResultBatch {
            frame_index: index,
            threshold,
            detections,
        });

        Ok(annotate(frame, &batch.detections))
    }

    /// Pull frames from `source` and hand processed frames to `sink` until
    /// the source ends, [`StreamCoordinator::stop`] is called, or the
    /// detector fails. Source errors skip that frame.
    ///
    /// A frame already pulled from the source always completes the full
    /// pipeline before the stop request is honoured. A stop requested
    /// before `run` begins is honoured too: nothing is pulled.
    pub fn run<S, K>(&self, source: &mut S, sink: &mut K) -> Result<StreamStats, DetectionError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        self.begin()?;

        loop {
            if self.stop_requested.swap(false, Ordering::AcqRel) {
                info!("Stop requested, leaving frame loop");
                break;
            }

            let frame = match source.next_frame() {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    warn!("Skipping unreadable frame: {}", e);
                    self.source_errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                None => {
                    info!("Frame source ended");
                    break;
                }
            };

            let out = self.run_pipeline(frame);
            sink.deliver(out)?;

            if self.state() == StreamState::Failed {
                return Err(DetectionError::ModelLoad(
                    "Detector failed during stream".to_string(),
                ));
            }
        }

        self.finish();
        Ok(self.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::detector::{share, MockDetector};
    use crate::models::RawDetection;
    use image::{Rgb, RgbImage};

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(1280, 720, Rgb([90, 90, 90]))).unwrap()
    }

    fn pothole(confidence: f32) -> RawDetection {
        RawDetection::new(3, confidence, [100.0, 100.0, 200.0, 200.0])
    }

    fn coordinator(mock: MockDetector, threshold: f32) -> StreamCoordinator {
        StreamCoordinator::new(
            share(mock),
            Arc::new(ThresholdController::new(threshold)),
            &PipelineConfig::default(),
        )
    }

    #[test]
    fn test_idle_passes_frames_through() {
        let mut mock = MockDetector::new();
        mock.expect_detect().never();
        let coordinator = coordinator(mock, 0.5);

        let input = frame();
        let out = coordinator.process(input.clone());
        assert!(out.shares_buffer(&input));
        assert_eq!(coordinator.state(), StreamState::Idle);
    }

    #[test]
    fn test_streaming_publishes_and_annotates() {
        let mut mock = MockDetector::new();
        mock.expect_input_size().return_const((640u32, 640u32));
        mock.expect_name().return_const("mock".to_string());
        mock.expect_detect().returning(|_, _| Ok(vec![pothole(0.8)]));
        let coordinator = coordinator(mock, 0.5);
        let mut rx = coordinator.subscribe();

        coordinator.start().unwrap();
        let input = frame();
        let out = coordinator.process(input.clone());

        assert_ne!(out, input);
        let batch = rx.try_latest().unwrap();
        assert_eq!(batch.detections.len(), 1);
        assert_eq!(batch.detections[0].bbox, [200, 112, 400, 225]);
        assert_eq!(coordinator.stats().frames_annotated, 1);
    }

    #[test]
    fn test_passes_snapshot_threshold_to_detector() {
        let mut mock = MockDetector::new();
        mock.expect_input_size().return_const((640u32, 640u32));
        mock.expect_name().return_const("mock".to_string());
        mock.expect_detect()
            .withf(|f, t| f.dimensions() == (640, 640) && (*t - 0.3).abs() < f32::EPSILON)
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let coordinator = coordinator(mock, 0.3);

        coordinator.start().unwrap();
        coordinator.process(frame());
    }

    #[test]
    fn test_inference_error_passes_original_through() {
        let mut mock = MockDetector::new();
        mock.expect_input_size().return_const((640u32, 640u32));
        mock.expect_name().return_const("mock".to_string());
        mock.expect_detect()
            .returning(|_, _| Err(DetectionError::Inference("bad tensor".to_string())));
        let coordinator = coordinator(mock, 0.5);

        coordinator.start().unwrap();
        let input = frame();
        let out = coordinator.process(input.clone());
        assert!(out.shares_buffer(&input));
        assert_eq!(coordinator.state(), StreamState::Streaming);
        assert_eq!(coordinator.stats().frames_passed_through, 1);
    }

    #[test]
    fn test_fatal_error_moves_to_failed() {
        let mut mock = MockDetector::new();
        mock.expect_input_size().return_const((640u32, 640u32));
        mock.expect_name().return_const("mock".to_string());
        mock.expect_detect()
            .times(1)
            .returning(|_, _| Err(DetectionError::ModelLoad("session lost".to_string())));
        let coordinator = coordinator(mock, 0.5);

        coordinator.start().unwrap();
        coordinator.process(frame());
        assert_eq!(coordinator.state(), StreamState::Failed);

        // No further inference once failed
        let input = frame();
        assert!(coordinator.process(input.clone()).shares_buffer(&input));
        assert!(coordinator.start().is_err());
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let mock = MockDetector::new();
        let coordinator = coordinator(mock, 0.5);
        coordinator.start().unwrap();
        assert_eq!(coordinator.state(), StreamState::Streaming);
        coordinator.stop();
        assert_eq!(coordinator.state(), StreamState::Idle);
        coordinator.start().unwrap();
        assert_eq!(coordinator.state(), StreamState::Streaming);
    }

    fn annotating_mock(calls: usize) -> MockDetector {
        let mut mock = MockDetector::new();
        mock.expect_input_size().return_const((640u32, 640u32));
        mock.expect_name().return_const("mock".to_string());
        mock.expect_detect()
            .times(calls)
            .returning(|_, _| Ok(vec![pothole(0.8)]));
        mock
    }

    #[test]
    fn test_stop_before_run_pulls_nothing() {
        let coordinator = coordinator(annotating_mock(2), 0.5);
        coordinator.stop();

        let mut first = (0..3).map(|_| Ok::<_, DetectionError>(frame()));
        let mut delivered = 0usize;
        let stats = coordinator
            .run(&mut first, &mut |_frame: Frame| -> Result<(), DetectionError> {
                delivered += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(stats.frames_annotated, 0);
        assert_eq!(first.count(), 3);
        assert_eq!(coordinator.state(), StreamState::Idle);

        // The request was consumed; the next run streams normally
        let mut second = (0..2).map(|_| Ok::<_, DetectionError>(frame()));
        let stats = coordinator
            .run(&mut second, &mut |_frame: Frame| -> Result<(), DetectionError> { Ok(()) })
            .unwrap();
        assert_eq!(stats.frames_annotated, 2);
    }

    /// Requests a stop while handing out its second frame
    struct StopOnPull<'a> {
        coordinator: &'a StreamCoordinator,
        pulls: usize,
    }

    impl FrameSource for StopOnPull<'_> {
        fn next_frame(&mut self) -> Option<Result<Frame, DetectionError>> {
            self.pulls += 1;
            if self.pulls == 2 {
                self.coordinator.stop();
            }
            Some(Ok(frame()))
        }
    }

    #[test]
    fn test_frame_pulled_before_stop_is_still_annotated() {
        let coordinator = coordinator(annotating_mock(2), 0.5);
        let mut source = StopOnPull {
            coordinator: &coordinator,
            pulls: 0,
        };
        let mut delivered = Vec::new();

        let stats = coordinator
            .run(&mut source, &mut |frame: Frame| -> Result<(), DetectionError> {
                delivered.push(frame);
                Ok(())
            })
            .unwrap();

        assert_eq!(source.pulls, 2);
        assert_eq!(delivered.len(), 2);
        assert_eq!(stats.frames_annotated, 2);
        assert_eq!(stats.frames_passed_through, 0);
        let raw = frame();
        assert!(delivered.iter().all(|f| *f != raw));
        assert_eq!(coordinator.state(), StreamState::Idle);
    }
}
