//! Continuous-input side of the pipeline

pub mod channel;
pub mod coordinator;
pub mod threshold;

pub use channel::{ResultBatch, ResultChannel, ResultReceiver};
pub use coordinator::{FrameSink, FrameSource, StreamCoordinator, StreamState, StreamStats};
pub use threshold::ThresholdController;
