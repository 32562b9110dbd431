pub mod keyboard_input;
pub mod orientation;
pub mod state;

mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;


pub use orchestrator::{PipelineOrchestrator, Platform};
pub use orientation::{FixedOrientation, OrientationMonitor, OrientationSource};
pub use state::{PresentationState, StateHandle, StateHolder, StateUpdate};
pub use types::ShutdownReason;
