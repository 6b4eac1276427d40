//! Result hand-off between the frame loop and a display consumer
//!
//! The channel holds at most one batch. Publishing never blocks and
//! replaces any batch the consumer has not read yet: a live table only
//! cares about the newest frame.

use crate::models::Detection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Detections produced for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
    /// Position of the frame in the stream, starting at 0
    pub frame_index: u64,
    /// Threshold snapshot the batch was filtered with
    pub threshold: f32,
    pub detections: Vec<Detection>,
}

/// Producer side of the single-slot channel
#[derive(Debug)]
pub struct ResultChannel {
    tx: watch::Sender<Option<Arc<ResultBatch>>>,
}

/// Consumer side; each receiver tracks which batch it has already seen
#[derive(Debug, Clone)]
pub struct ResultReceiver {
    rx: watch::Receiver<Option<Arc<ResultBatch>>>,
}

impl ResultChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Store `batch`, overwriting an unconsumed one. Works with or without
    /// live receivers.
    pub fn publish(&self, batch: ResultBatch) -> Arc<ResultBatch> {
        let batch = Arc::new(batch);
        let replaced = self.tx.send_replace(Some(Arc::clone(&batch)));
        if let Some(old) = replaced {
            debug!("Batch for frame {} replaced by frame {}", old.frame_index, batch.frame_index);
        }
        batch
    }

    /// New consumer; batches published before this call count as seen
    pub fn subscribe(&self) -> ResultReceiver {
        ResultReceiver { rx: self.tx.subscribe() }
    }

    /// Most recent batch regardless of what consumers have seen
    pub fn latest(&self) -> Option<Arc<ResultBatch>> {
        self.tx.borrow().clone()
    }
}

impl Default for ResultChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultReceiver {
    /// Take the pending batch if one arrived since the last read
    pub fn try_latest(&mut self) -> Option<Arc<ResultBatch>> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// Wait up to `wait` for a batch newer than the last one read. Returns
    /// `None` on timeout or once the producer is gone.
    pub async fn next_batch(&mut self, wait: Duration) -> Option<Arc<ResultBatch>> {
        match tokio::time::timeout(wait, self.rx.changed()).await {
            Ok(Ok(())) => self.rx.borrow_and_update().clone(),
            Ok(Err(_)) => {
                debug!("Result channel closed");
                None
            }
            Err(_) => None,
        }
    }
}
