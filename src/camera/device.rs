use super::session::FrameFeed;
use crate::error::CameraError;
use crate::frame::CameraPosition;

/// An opened camera device. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub position: CameraPosition,
    pub unique_id: String,
    pub name: String,
}

impl CaptureDevice {
    pub fn new(position: CameraPosition, unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            position,
            unique_id: unique_id.into(),
            name: name.into(),
        }
    }
}

/// Platform camera hardware.
///
/// Every method may block; callers run them on the blocking pool and never
/// on the task that owns presentation state.
pub trait CaptureHardware: Send + Sync + 'static {
    /// Open the built-in wide-angle camera at `position`.
    /// `Ok(None)` means the device has no camera there.
    fn open(&self, position: CameraPosition) -> Result<Option<CaptureDevice>, CameraError>;

    /// Whether the session may take `device` as an input
    fn accepts_input(&self, _device: &CaptureDevice) -> bool {
        true
    }

    /// Whether the session may take a video data output
    fn accepts_output(&self) -> bool {
        true
    }

    /// Start streaming frames into `feed`; returns once the hardware runs
    fn start(&self, feed: FrameFeed) -> Result<(), CameraError>;

    /// Stop streaming; returns once the hardware has stopped
    fn stop(&self);
}
