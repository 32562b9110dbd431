use super::label::{ClassificationCandidate, ClassificationResult};
use super::model::{resolve_model_path, Classifier, ModelLoader};
use crate::app::state::{StateHandle, StateUpdate};
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::frame::{decode_frame, RawFrame};
use crate::status::{ModelStatus, RunStatus};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Counters for the classification stage
#[derive(Debug, Default)]
pub struct EngineStats {
    pub inferences: AtomicU64,
    pub dropped_busy: AtomicU64,
    pub rejected_below_threshold: AtomicU64,
    pub discarded_stale: AtomicU64,
    pub decode_failures: AtomicU64,
    pub inference_failures: AtomicU64,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            inferences: self.inferences.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            rejected_below_threshold: self.rejected_below_threshold.load(Ordering::Relaxed),
            discarded_stale: self.discarded_stale.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub inferences: u64,
    pub dropped_busy: u64,
    pub rejected_below_threshold: u64,
    pub discarded_stale: u64,
    pub decode_failures: u64,
    pub inference_failures: u64,
}

/// What happened to a frame offered to the engine
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Inference started; resolves to the published result, if any
    Started(JoinHandle<Option<ClassificationResult>>),
    /// Another inference is in flight, frame dropped
    Busy,
    /// Model not loaded, frame dropped
    NotReady,
}

/// Loads the classifier once and runs at most one inference at a time.
pub struct ClassificationEngine {
    config: ClassifierConfig,
    loader: Arc<dyn ModelLoader>,
    status: Mutex<ModelStatus>,
    model: RwLock<Option<Arc<dyn Classifier>>>,
    in_flight: Arc<Semaphore>,
    stats: EngineStats,
    state_handle: StateHandle,
}

impl ClassificationEngine {
    pub fn new(config: ClassifierConfig, loader: Arc<dyn ModelLoader>, state_handle: StateHandle) -> Self {
        Self {
            config,
            loader,
            status: Mutex::new(ModelStatus::NotStarted),
            model: RwLock::new(None),
            in_flight: Arc::new(Semaphore::new(1)),
            stats: EngineStats::default(),
            state_handle,
        }
    }

    /// Load the model asset. Runs once; later calls return the current status.
    pub async fn load_model(&self) -> ModelStatus {
        {
            let mut status = self.status.lock();
            if *status != ModelStatus::NotStarted {
                debug!("Model load already {:?}, skipping", *status);
                return *status;
            }
            *status = ModelStatus::Loading;
        }
        self.state_handle
            .send(StateUpdate::ModelStatus(ModelStatus::Loading));

        let primary = self.config.model_path.clone();
        let fallback = self.config.fallback_model_path.clone();
        let loader = Arc::clone(&self.loader);

        let loaded = tokio::task::spawn_blocking(move || {
            let path = resolve_model_path(&primary, &fallback)?;
            info!("Loading model from {:?}", path);
            loader.load(&path)
        })
        .await
        .unwrap_or_else(|e| {
            Err(ClassifierError::Task {
                details: e.to_string(),
            })
        });

        let status = match loaded {
            Ok(model) => {
                info!("Classifier '{}' ready", model.name());
                *self.model.write() = Some(model);
                ModelStatus::Success
            }
            Err(e) => {
                error!("Failed to load classifier: {}", e);
                ModelStatus::Failed
            }
        };

        *self.status.lock() = status;
        self.state_handle.send(StateUpdate::ModelStatus(status));
        status
    }

    pub fn status(&self) -> ModelStatus {
        *self.status.lock()
    }

    /// Classify one frame synchronously.
    ///
    /// Returns `None` when the model is not ready, the frame cannot be
    /// decoded or inference produced nothing. Blocks for the duration of
    /// the forward pass.
    pub fn classify(&self, frame: &RawFrame) -> Option<ClassificationCandidate> {
        if self.status() != ModelStatus::Success {
            return None;
        }
        let model = self.model.read().clone()?;

        let image = match decode_frame(frame) {
            Ok(image) => image,
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Skipping undecodable frame: {}", e);
                return None;
            }
        };

        self.stats.inferences.fetch_add(1, Ordering::Relaxed);
        let distribution = match model.predict(&image) {
            Ok(distribution) => distribution,
            Err(e) => {
                self.stats.inference_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Inference on frame {} failed: {}", frame.id, e);
                return None;
            }
        };

        let candidate = ClassificationCandidate::from_distribution(distribution, frame.id);
        if candidate.is_none() {
            self.stats.inference_failures.fetch_add(1, Ordering::Relaxed);
            debug!("Frame {}: {}", frame.id, ClassifierError::EmptyDistribution);
        }
        candidate
    }

    /// Apply the confidence threshold to a candidate
    pub fn accept(&self, candidate: ClassificationCandidate) -> Option<ClassificationResult> {
        let label = candidate.label.clone();
        let confidence = candidate.confidence;

        let result = ClassificationResult::accept(candidate, self.config.confidence_threshold);
        if result.is_none() {
            self.stats
                .rejected_below_threshold
                .fetch_add(1, Ordering::Relaxed);
            trace!("Rejected '{}' at {:.3}", label, confidence);
        }
        result
    }

    /// Offer a frame for classification without waiting.
    ///
    /// At most one inference runs at a time; a frame arriving while one is
    /// in flight is dropped, never queued. A finished inference is only
    /// published if capture is still running.
    pub fn try_submit(
        self: &Arc<Self>,
        frame: RawFrame,
        run_status: watch::Receiver<RunStatus>,
    ) -> SubmitOutcome {
        if self.status() != ModelStatus::Success {
            return SubmitOutcome::NotReady;
        }

        let permit = match Arc::clone(&self.in_flight).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.stats.dropped_busy.fetch_add(1, Ordering::Relaxed);
                trace!("Inference busy, dropping frame {}", frame.id);
                return SubmitOutcome::Busy;
            }
        };

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let frame_id = frame.id;

            let worker = Arc::clone(&engine);
            let candidate = match tokio::task::spawn_blocking(move || worker.classify(&frame)).await {
                Ok(candidate) => candidate?,
                Err(e) => {
                    warn!("Inference task for frame {} failed: {}", frame_id, e);
                    return None;
                }
            };

            if *run_status.borrow() != RunStatus::Running {
                engine.stats.discarded_stale.fetch_add(1, Ordering::Relaxed);
                debug!("Capture no longer running, discarding result for frame {}", frame_id);
                return None;
            }

            let result = engine.accept(candidate)?;
            debug!(
                "Frame {} classified as '{}' ({:.1}%)",
                frame_id,
                result.label,
                result.confidence * 100.0
            );
            engine
                .state_handle
                .send(StateUpdate::Classification(result.clone()));
            Some(result)
        });

        SubmitOutcome::Started(handle)
    }

    /// Whether an inference is currently running
    pub fn is_busy(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }
}
