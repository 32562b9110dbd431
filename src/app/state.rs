use crate::classifier::ClassificationResult;
use crate::error::UserFacingError;
use crate::events::{EventBus, PipelineEvent};
use crate::frame::{CameraPosition, DecodedFrame, SessionConfig};
use crate::status::{CompositeStatus, ModelStatus, RunStatus, SetupStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A change marshalled from a background component to the state holder
#[derive(Debug, Clone)]
pub enum StateUpdate {
    CameraSetup(SetupStatus),
    ModelStatus(ModelStatus),
    RunStatus(RunStatus),
    ActiveCamera {
        position: CameraPosition,
        config: SessionConfig,
    },
    SessionConfig(SessionConfig),
    Frame(DecodedFrame),
    Classification(ClassificationResult),
    Error(UserFacingError),
}

/// Cloneable sending side of the state holder's inbox
#[derive(Debug, Clone)]
pub struct StateHandle {
    sender: mpsc::UnboundedSender<StateUpdate>,
}

impl StateHandle {
    pub fn send(&self, update: StateUpdate) {
        if self.sender.send(update).is_err() {
            trace!("State holder is gone, update dropped");
        }
    }
}

/// Create a detached handle/inbox pair, for components driven without a holder
pub fn state_channel() -> (StateHandle, mpsc::UnboundedReceiver<StateUpdate>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (StateHandle { sender }, receiver)
}

/// Everything the presenter reads
#[derive(Debug, Clone)]
pub struct PresentationState {
    pub camera_setup: SetupStatus,
    pub model_status: ModelStatus,
    pub run_status: RunStatus,
    pub active_camera: Option<CameraPosition>,
    pub session_config: Option<SessionConfig>,
    pub latest_frame: Option<DecodedFrame>,
    /// Sticky: replaced by newer results, never cleared
    pub latest_result: Option<ClassificationResult>,
    pub latest_error: Option<UserFacingError>,
}

impl Default for PresentationState {
    fn default() -> Self {
        Self {
            camera_setup: SetupStatus::NotStarted,
            model_status: ModelStatus::NotStarted,
            run_status: RunStatus::Stopped,
            active_camera: None,
            session_config: None,
            latest_frame: None,
            latest_result: None,
            latest_error: None,
        }
    }
}

impl PresentationState {
    /// Apply one update. Returns whether anything changed.
    pub fn apply(&mut self, update: StateUpdate) -> bool {
        match update {
            StateUpdate::CameraSetup(status) => replace(&mut self.camera_setup, status),
            StateUpdate::ModelStatus(status) => replace(&mut self.model_status, status),
            StateUpdate::RunStatus(status) => replace(&mut self.run_status, status),
            StateUpdate::ActiveCamera { position, config } => {
                let camera_changed = replace(&mut self.active_camera, Some(position));
                let config_changed = replace(&mut self.session_config, Some(config));
                camera_changed || config_changed
            }
            StateUpdate::SessionConfig(config) => replace(&mut self.session_config, Some(config)),
            StateUpdate::Frame(frame) => {
                self.latest_frame = Some(frame);
                true
            }
            StateUpdate::Classification(result) => {
                self.latest_result = Some(result);
                true
            }
            StateUpdate::Error(error) => {
                self.latest_error = Some(error);
                true
            }
        }
    }

    pub fn composite_status(&self) -> CompositeStatus {
        CompositeStatus::derive(self.camera_setup, self.model_status, self.run_status)
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Sole owner of [`PresentationState`].
///
/// Components never touch the state directly; they send [`StateUpdate`]s
/// through a [`StateHandle`] and the holder applies them in order,
/// publishes a snapshot and republishes discrete changes on the event bus.
pub struct StateHolder {
    state: PresentationState,
    updates: mpsc::UnboundedReceiver<StateUpdate>,
    snapshot: watch::Sender<PresentationState>,
    event_bus: Arc<EventBus>,
}

impl StateHolder {
    pub fn new(event_bus: Arc<EventBus>) -> (Self, StateHandle) {
        let (handle, updates) = state_channel();
        let (snapshot, _) = watch::channel(PresentationState::default());

        let holder = Self {
            state: PresentationState::default(),
            updates,
            snapshot,
            event_bus,
        };
        (holder, handle)
    }

    /// Receive presentation snapshots
    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.snapshot.subscribe()
    }

    /// Process updates until cancelled or every handle is dropped
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        debug!("State holder started");

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    // Flush whatever was marshalled before cancellation
                    while let Ok(update) = self.updates.try_recv() {
                        self.handle(update).await;
                    }
                    self.publish_snapshot();
                    break;
                }
                update = self.updates.recv() => {
                    let Some(update) = update else {
                        debug!("All state handles dropped");
                        break;
                    };
                    self.handle(update).await;
                    while let Ok(update) = self.updates.try_recv() {
                        self.handle(update).await;
                    }
                    self.publish_snapshot();
                }
            }
        }

        debug!("State holder stopped");
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.state.clone());
    }

    async fn handle(&mut self, update: StateUpdate) {
        let before = self.state.composite_status();
        let event = Self::event_for(&update);

        if !self.state.apply(update) {
            return;
        }

        if let Some(event) = event {
            self.publish(event).await;
        }

        let after = self.state.composite_status();
        if after != before {
            self.publish(PipelineEvent::CompositeStatusChanged { status: after })
                .await;
        }
    }

    fn event_for(update: &StateUpdate) -> Option<PipelineEvent> {
        match update {
            StateUpdate::CameraSetup(status) => {
                Some(PipelineEvent::CameraSetupChanged { status: *status })
            }
            StateUpdate::ModelStatus(status) => {
                Some(PipelineEvent::ModelStatusChanged { status: *status })
            }
            StateUpdate::RunStatus(status) => Some(PipelineEvent::RunStatusChanged { status: *status }),
            StateUpdate::ActiveCamera { position, config } => Some(PipelineEvent::ActiveCameraChanged {
                position: *position,
                config: *config,
            }),
            StateUpdate::Classification(result) => Some(PipelineEvent::ClassificationPublished {
                label: result.label.clone(),
                confidence: result.confidence,
                frame_id: result.frame_id,
                timestamp: result.timestamp,
            }),
            StateUpdate::Error(error) => Some(PipelineEvent::ErrorRaised { error: *error }),
            StateUpdate::SessionConfig(_) | StateUpdate::Frame(_) => None,
        }
    }

    async fn publish(&self, event: PipelineEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            warn!("Failed to publish state event: {}", e);
        }
    }
}
