use super::keyboard_input::KeyboardInputHandler;
use super::orientation::{FixedOrientation, OrientationMonitor, OrientationSource};
use super::state::{PresentationState, StateHandle, StateHolder};
use super::types::ShutdownReason;
use crate::camera::{CaptureDeviceRegistry, CaptureHardware, SimulatedCamera};
use crate::classifier::{CentroidModelLoader, ClassificationEngine, ModelLoader};
use crate::config::LiveLabelConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::frame::{CameraPosition, DeviceOrientation};
use crate::frame_slot::{frame_slot, FrameReceiver};
use crate::permission::{PermissionGate, PermissionProvider, StaticPermissions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Platform collaborators the pipeline is wired to
#[derive(Clone)]
pub struct Platform {
    pub permissions: Arc<dyn PermissionProvider>,
    pub hardware: Arc<dyn CaptureHardware>,
    pub model_loader: Arc<dyn ModelLoader>,
    pub orientation: Arc<dyn OrientationSource>,
}

impl Platform {
    /// Simulated platform driven by the configuration
    pub fn simulated(config: &LiveLabelConfig) -> Self {
        Self {
            permissions: Arc::new(StaticPermissions::new(
                config.camera.permission,
                config.camera.grant_on_request,
            )),
            hardware: Arc::new(SimulatedCamera::new(&config.camera)),
            model_loader: Arc::new(CentroidModelLoader),
            orientation: Arc::new(FixedOrientation::new(DeviceOrientation::Portrait)),
        }
    }
}

/// Wires the camera registry, the classification engine and the
/// presentation state holder into one frame-to-inference pipeline.
pub struct PipelineOrchestrator {
    pub(super) config: LiveLabelConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) registry: Arc<CaptureDeviceRegistry>,
    pub(super) engine: Arc<ClassificationEngine>,
    pub(super) state_handle: StateHandle,
    pub(super) presentation: watch::Receiver<PresentationState>,
    pub(super) frame_receiver: Arc<tokio::sync::Mutex<FrameReceiver>>,
    pub(super) orientation: OrientationMonitor,

    // Background tasks
    pub(super) frame_loop: parking_lot::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    pub(super) holder_task: Option<JoinHandle<()>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl PipelineOrchestrator {
    /// Create an orchestrator on the simulated platform
    pub async fn new(config: LiveLabelConfig) -> Result<Self> {
        let platform = Platform::simulated(&config);
        Self::with_platform(config, platform).await
    }

    /// Create an orchestrator on the given platform collaborators
    pub async fn with_platform(config: LiveLabelConfig, platform: Platform) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let cancellation_token = CancellationToken::new();

        let (holder, state_handle) = StateHolder::new(Arc::clone(&event_bus));
        let presentation = holder.subscribe();
        let holder_task = tokio::spawn(holder.run(cancellation_token.child_token()));

        let (frame_sender, frame_receiver) = frame_slot();

        let registry = Arc::new(CaptureDeviceRegistry::new(
            config.camera.clone(),
            PermissionGate::new(platform.permissions),
            platform.hardware,
            frame_sender,
            state_handle.clone(),
        ));

        let engine = Arc::new(ClassificationEngine::new(
            config.classifier.clone(),
            platform.model_loader,
            state_handle.clone(),
        ));

        let orientation = OrientationMonitor::new(
            platform.orientation,
            Duration::from_millis(config.presentation.orientation_settle_ms),
        );

        let keyboard_handler = Some(KeyboardInputHandler::new(Arc::clone(&event_bus)));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        info!("Pipeline created");

        Ok(Self {
            config,
            event_bus,
            registry,
            engine,
            state_handle,
            presentation,
            frame_receiver: Arc::new(tokio::sync::Mutex::new(frame_receiver)),
            orientation,
            frame_loop: parking_lot::Mutex::new(None),
            holder_task: Some(holder_task),
            keyboard_handler,
            keyboard_enabled: false, // enable via set_keyboard_enabled()
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        })
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Swap between the front and back cameras
    pub fn switch_camera(&self) -> Option<CameraPosition> {
        self.registry.switch_camera()
    }

    /// Receive presentation snapshots
    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.presentation.clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn registry(&self) -> Arc<CaptureDeviceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn engine(&self) -> Arc<ClassificationEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &LiveLabelConfig {
        &self.config
    }
}
