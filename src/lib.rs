pub mod app;
pub mod camera;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_slot;
pub mod permission;
pub mod status;

pub use app::{PipelineOrchestrator, Platform, PresentationState, ShutdownReason};
pub use camera::{CaptureDeviceRegistry, CaptureHardware, SimulatedCamera};
pub use classifier::{ClassificationEngine, ClassificationResult, Classifier, ModelLoader};
pub use config::LiveLabelConfig;
pub use error::{LiveLabelError, Result, UserFacingError};
pub use events::{EventBus, EventFilter, EventReceiver, PipelineEvent};
pub use frame::{CameraPosition, FrameFormat, RawFrame, SessionConfig};
pub use frame_slot::{frame_slot, FrameReceiver, FrameSender};
pub use permission::{AuthorizationStatus, PermissionGate, PermissionOutcome, PermissionProvider};
pub use status::{CompositeStatus, ModelStatus, RunStatus, SetupStatus};
