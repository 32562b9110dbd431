use crate::error::{EventBusError, UserFacingError};
use crate::frame::{CameraPosition, SessionConfig};
use crate::status::{CompositeStatus, ModelStatus, RunStatus, SetupStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Discrete changes observable outside the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Camera setup status changed
    CameraSetupChanged { status: SetupStatus },
    /// Classifier setup status changed
    ModelStatusChanged { status: ModelStatus },
    /// Capture session run status changed
    RunStatusChanged { status: RunStatus },
    /// The derived status shown to the user changed
    CompositeStatusChanged { status: CompositeStatus },
    /// The active camera changed (setup or switch)
    ActiveCameraChanged {
        position: CameraPosition,
        config: SessionConfig,
    },
    /// A new classification result cleared the threshold
    ClassificationPublished {
        label: String,
        confidence: f64,
        frame_id: u64,
        timestamp: DateTime<Utc>,
    },
    /// A user-visible error was raised
    ErrorRaised { error: UserFacingError },
    /// Switching cameras was requested by the user
    SwitchCameraRequested,
    /// System shutdown requested
    ShutdownRequested { reason: String },
}

impl PipelineEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PipelineEvent::CameraSetupChanged { status } => format!("Camera setup: {:?}", status),
            PipelineEvent::ModelStatusChanged { status } => format!("Classifier setup: {:?}", status),
            PipelineEvent::RunStatusChanged { status } => format!("Capture run status: {:?}", status),
            PipelineEvent::CompositeStatusChanged { status } => format!("Status: {:?}", status),
            PipelineEvent::ActiveCameraChanged { position, config } => format!(
                "Active camera: {} (mirrored: {})",
                position.as_str(),
                config.mirrored
            ),
            PipelineEvent::ClassificationPublished {
                label, confidence, ..
            } => format!("{} ({:.1}%)", label, confidence * 100.0),
            PipelineEvent::ErrorRaised { error } => format!("Error: {}", error),
            PipelineEvent::SwitchCameraRequested => "Switch camera requested".to_string(),
            PipelineEvent::ShutdownRequested { reason } => format!("Shutdown requested: {}", reason),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::CameraSetupChanged { .. } => "camera_setup_changed",
            PipelineEvent::ModelStatusChanged { .. } => "model_status_changed",
            PipelineEvent::RunStatusChanged { .. } => "run_status_changed",
            PipelineEvent::CompositeStatusChanged { .. } => "composite_status_changed",
            PipelineEvent::ActiveCameraChanged { .. } => "active_camera_changed",
            PipelineEvent::ClassificationPublished { .. } => "classification_published",
            PipelineEvent::ErrorRaised { .. } => "error_raised",
            PipelineEvent::SwitchCameraRequested => "switch_camera_requested",
            PipelineEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it; publishing with
    /// no subscribers is not an error.
    pub async fn publish(&self, event: PipelineEvent) -> Result<usize, EventBusError> {
        match &event {
            PipelineEvent::ErrorRaised { error: e } => {
                error!("Pipeline error: {}", e);
            }
            PipelineEvent::CompositeStatusChanged { status } => {
                info!("Pipeline status: {:?}", status);
            }
            PipelineEvent::ShutdownRequested { reason } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                trace!("Event: {}", event.description());
            }
        }

        if self.sender.receiver_count() == 0 {
            trace!("No subscribers for {}", event.event_type());
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &PipelineEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<PipelineEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<PipelineEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<PipelineEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
