mod device;
mod registry;
mod session;
mod simulated;

pub use device::{CaptureDevice, CaptureHardware};
pub use registry::CaptureDeviceRegistry;
pub use session::{CaptureSession, ConfigurationBracket, FrameFeed, OutputConnection};
pub use simulated::SimulatedCamera;
