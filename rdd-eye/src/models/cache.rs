//! Process-wide detector cache
//!
//! Model loads are expensive, so each cache key is loaded at most once per
//! process. A failed load is remembered: later lookups fail fast with the
//! same `ModelLoad` error until the operator evicts the key.

use crate::config::PipelineConfig;
use crate::error::DetectionError;
use crate::models::detector::{load_model, SharedDetector};
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

type LoadOutcome = Result<SharedDetector, String>;

/// Lazily initialized detectors keyed by a fixed identifier
pub struct DetectorCache {
    slots: DashMap<String, Arc<OnceLock<LoadOutcome>>>,
}

impl DetectorCache {
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// The cache shared by the whole process
    pub fn global() -> &'static DetectorCache {
        static GLOBAL: OnceLock<DetectorCache> = OnceLock::new();
        GLOBAL.get_or_init(DetectorCache::new)
    }

    /// Return the detector cached under `key`, running `load` if this is
    /// the first request for it. Concurrent callers for the same key wait
    /// for the single load in flight.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<SharedDetector, DetectionError>
    where
        F: FnOnce() -> Result<SharedDetector, DetectionError>,
    {
        // Clone the slot out so the shard lock is not held during the load
        let slot = Arc::clone(
            &*self
                .slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceLock::new())),
        );

        let outcome = slot.get_or_init(|| {
            info!("Loading detector for cache key {}", key);
            match load() {
                Ok(detector) => Ok(detector),
                Err(DetectionError::ModelLoad(msg)) => {
                    error!("Detector load failed for {}: {}", key, msg);
                    Err(msg)
                }
                Err(other) => {
                    error!("Detector load failed for {}: {}", key, other);
                    Err(other.to_string())
                }
            }
        });

        match outcome {
            Ok(detector) => Ok(Arc::clone(detector)),
            Err(msg) => Err(DetectionError::ModelLoad(msg.clone())),
        }
    }

    /// Load (once) the detector described by `config`
    pub fn load(&self, config: &PipelineConfig) -> Result<SharedDetector, DetectionError> {
        self.get_or_load(&config.cache_key, || {
            load_model(&config.model_path, config.input_size)
        })
    }

    /// Whether a load has completed successfully for `key`
    pub fn is_loaded(&self, key: &str) -> bool {
        self.slots
            .get(key)
            .and_then(|slot| slot.get().map(|outcome| outcome.is_ok()))
            .unwrap_or(false)
    }

    /// Forget `key` so the next lookup loads again
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.slots.remove(key).is_some();
        if removed {
            info!("Evicted detector cache key {}", key);
        }
        removed
    }
}

impl Default for DetectorCache {
    fn default() -> Self {
        Self::new()
    }
}
