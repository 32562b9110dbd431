use super::state::{StateHandle, StateUpdate};
use super::PipelineOrchestrator;
use crate::classifier::{ClassificationEngine, SubmitOutcome};
use crate::frame::{decode_frame, DecodedFrame};
use crate::frame_slot::FrameReceiver;
use crate::status::{CompositeStatus, ModelStatus, RunStatus, SetupStatus};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

impl PipelineOrchestrator {
    /// Set up the camera, then the classifier, then start capture.
    ///
    /// A step that does not succeed ends the sequence; nothing is retried.
    pub async fn on_appear(&self) -> CompositeStatus {
        if self.prepare().await != CompositeStatus::Stopped {
            return self.current_status();
        }

        self.start_capture().await;
        self.current_status()
    }

    /// Camera and classifier setup without starting capture
    pub async fn prepare(&self) -> CompositeStatus {
        info!("Preparing pipeline");

        let camera = self.registry.setup().await;
        if camera != SetupStatus::Success {
            info!("Camera setup ended in {:?}, not loading classifier", camera);
            return self.current_status();
        }

        let model = self.engine.load_model().await;
        if model != ModelStatus::Success {
            info!("Classifier setup ended in {:?}, not starting capture", model);
        }

        self.current_status()
    }

    /// Start the capture session, the frame loop and the orientation monitor
    pub async fn start_capture(&self) -> RunStatus {
        let status = self.registry.start().await;
        if status != RunStatus::Running {
            return status;
        }

        self.orientation.start(Arc::clone(&self.registry));
        self.spawn_frame_loop();
        status
    }

    /// Composite status computed from the components directly
    pub fn current_status(&self) -> CompositeStatus {
        CompositeStatus::derive(
            self.registry.setup_status(),
            self.engine.status(),
            self.registry.run_status(),
        )
    }

    fn spawn_frame_loop(&self) {
        let mut frame_loop = self.frame_loop.lock();
        if frame_loop.is_some() {
            debug!("Frame loop already running");
            return;
        }

        let token = self.cancellation_token.child_token();
        let handle = tokio::spawn(Self::frame_loop(
            Arc::clone(&self.frame_receiver),
            Arc::clone(&self.engine),
            self.registry.run_status_watch(),
            self.state_handle.clone(),
            token.clone(),
        ));
        *frame_loop = Some((token, handle));
    }

    async fn frame_loop(
        receiver: Arc<tokio::sync::Mutex<FrameReceiver>>,
        engine: Arc<ClassificationEngine>,
        run_status: watch::Receiver<RunStatus>,
        state_handle: StateHandle,
        token: CancellationToken,
    ) {
        let mut receiver = receiver.lock().await;
        debug!("Frame loop started");

        loop {
            let frame = tokio::select! {
                _ = token.cancelled() => break,
                frame = receiver.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        debug!("Frame source closed");
                        break;
                    }
                },
            };

            match engine.try_submit(frame.clone(), run_status.clone()) {
                SubmitOutcome::Started(_) => trace!("Inference started for frame {}", frame.id),
                SubmitOutcome::Busy => trace!("Frame {} not classified, engine busy", frame.id),
                SubmitOutcome::NotReady => {}
            }

            let (id, timestamp) = (frame.id, frame.timestamp);
            match tokio::task::spawn_blocking(move || decode_frame(&frame)).await {
                Ok(Ok(image)) => state_handle.send(StateUpdate::Frame(DecodedFrame {
                    id,
                    timestamp,
                    image: Arc::new(image),
                })),
                Ok(Err(e)) => debug!("Frame {} not shown: {}", id, e),
                Err(e) => warn!("Decode task for frame {} failed: {}", id, e),
            }
        }

        debug!("Frame loop stopped");
    }
}
