use crate::frame::CameraPosition;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveLabelError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },
}

impl LiveLabelError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Capture hardware and session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("No camera device could be opened")]
    DeviceUnavailable,

    #[error("Capture session rejected the video output")]
    CannotAddOutput,

    #[error("Capture session rejected the {position:?} camera input")]
    CannotAddInput { position: CameraPosition },

    #[error("Capture session start failed: {details}")]
    Start { details: String },

    #[error("Background task failed: {details}")]
    Task { details: String },
}

/// Model loading and inference errors
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model asset not found (looked in {primary:?} and {fallback:?})")]
    AssetMissing { primary: PathBuf, fallback: PathBuf },

    #[error("Failed to read model asset {path:?}: {source}")]
    AssetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model asset {path:?}: {details}")]
    InvalidModel { path: PathBuf, details: String },

    #[error("Inference failed: {details}")]
    Inference { details: String },

    #[error("Model produced an empty label distribution")]
    EmptyDistribution,

    #[error("Background task failed: {details}")]
    Task { details: String },
}

/// Raw frame decoding errors
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame {frame_id} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        frame_id: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Frame {frame_id} has zero dimensions")]
    EmptyFrame { frame_id: u64 },

    #[error("Failed to decode frame {frame_id}: {details}")]
    Decode { frame_id: u64, details: String },
}

/// Event bus errors
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

/// Errors surfaced to the presenter as a banner.
///
/// Nothing in the pipeline throws past its own subsystem; failures end up
/// as one of these values next to a `failed`/`access*` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserFacingError {
    CameraUnavailable,
    DeniedAuthorization,
    RestrictedAuthorization,
    UnknownAuthorization,
    CannotAddOutput,
    CannotAddInput,
}

impl UserFacingError {
    pub fn message(&self) -> &'static str {
        match self {
            UserFacingError::CameraUnavailable => {
                "Camera is unavailable. Please check that the device has a working camera."
            }
            UserFacingError::DeniedAuthorization => {
                "Camera access was denied. Enable it in the system privacy settings."
            }
            UserFacingError::RestrictedAuthorization => {
                "Camera access is restricted by a system policy."
            }
            UserFacingError::UnknownAuthorization => "Camera authorization is in an unknown state.",
            UserFacingError::CannotAddOutput => "Cannot attach the video output to the camera.",
            UserFacingError::CannotAddInput => "Cannot attach the camera input.",
        }
    }
}

impl std::fmt::Display for UserFacingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<&CameraError> for UserFacingError {
    fn from(error: &CameraError) -> Self {
        match error {
            CameraError::CannotAddOutput => UserFacingError::CannotAddOutput,
            CameraError::CannotAddInput { .. } => UserFacingError::CannotAddInput,
            CameraError::DeviceUnavailable
            | CameraError::Start { .. }
            | CameraError::Task { .. } => UserFacingError::CameraUnavailable,
        }
    }
}

pub type Result<T, E = LiveLabelError> = std::result::Result<T, E>;
