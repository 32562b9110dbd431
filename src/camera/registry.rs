use super::device::{CaptureDevice, CaptureHardware};
use super::session::{CaptureSession, ConfigurationBracket, OutputConnection};
use crate::app::state::{StateHandle, StateUpdate};
use crate::config::CameraConfig;
use crate::error::{CameraError, UserFacingError};
use crate::frame::{CameraPosition, SessionConfig, VideoOrientation};
use crate::frame_slot::FrameSender;
use crate::permission::{PermissionGate, PermissionOutcome};
use crate::status::{RunStatus, SetupStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct RegistryState {
    setup_status: SetupStatus,
    front: Option<CaptureDevice>,
    back: Option<CaptureDevice>,
    active: Option<CameraPosition>,
    last_error: Option<UserFacingError>,
    preview_orientation: VideoOrientation,
}

/// Owns the camera devices and the capture session, and drives the
/// setup and run state machines.
pub struct CaptureDeviceRegistry {
    config: CameraConfig,
    permissions: PermissionGate,
    hardware: Arc<dyn CaptureHardware>,
    session: Arc<CaptureSession>,
    state: Mutex<RegistryState>,
    run_status: watch::Sender<RunStatus>,
    // Serializes start/stop so a run transition is never interleaved
    run_lock: tokio::sync::Mutex<()>,
    state_handle: StateHandle,
}

impl CaptureDeviceRegistry {
    pub fn new(
        config: CameraConfig,
        permissions: PermissionGate,
        hardware: Arc<dyn CaptureHardware>,
        frame_sender: FrameSender,
        state_handle: StateHandle,
    ) -> Self {
        let session = CaptureSession::new(Arc::clone(&hardware), frame_sender);
        let (run_status, _) = watch::channel(RunStatus::Stopped);

        Self {
            config,
            permissions,
            hardware,
            session,
            state: Mutex::new(RegistryState {
                setup_status: SetupStatus::NotStarted,
                front: None,
                back: None,
                active: None,
                last_error: None,
                preview_orientation: VideoOrientation::Portrait,
            }),
            run_status,
            run_lock: tokio::sync::Mutex::new(()),
            state_handle,
        }
    }

    /// Check permissions, open the cameras and configure the session.
    ///
    /// Does nothing unless setup has not started yet; a second call while
    /// the first is in flight returns immediately.
    pub async fn setup(&self) -> SetupStatus {
        {
            let mut state = self.state.lock();
            if state.setup_status != SetupStatus::NotStarted {
                debug!("Camera setup already {:?}, skipping", state.setup_status);
                return state.setup_status;
            }
            state.setup_status = SetupStatus::Loading;
        }
        self.state_handle
            .send(StateUpdate::CameraSetup(SetupStatus::Loading));

        info!("Setting up camera");

        let refused = match self.permissions.check_and_request_access().await {
            PermissionOutcome::Granted => None,
            PermissionOutcome::DeniedByUser | PermissionOutcome::DeniedPreviously => Some((
                SetupStatus::AccessDenied,
                UserFacingError::DeniedAuthorization,
            )),
            PermissionOutcome::RestrictedByPolicy => Some((
                SetupStatus::AccessRestricted,
                UserFacingError::RestrictedAuthorization,
            )),
            PermissionOutcome::Unknown => {
                Some((SetupStatus::Failed, UserFacingError::UnknownAuthorization))
            }
        };

        if let Some((status, user_error)) = refused {
            warn!("Camera access not granted: {:?}", status);
            return self.finish_setup(status, Some(user_error));
        }

        let (back, front) = tokio::join!(
            self.open_device(CameraPosition::Back),
            self.open_device(CameraPosition::Front)
        );

        match self.attach_devices(back, front) {
            Ok(active) => {
                info!("Camera setup complete, active camera: {}", active.as_str());
                let config = self.session_config();
                self.state_handle.send(StateUpdate::ActiveCamera {
                    position: active,
                    config,
                });
                self.finish_setup(SetupStatus::Success, None)
            }
            Err(e) => {
                error!("Camera setup failed: {}", e);
                self.finish_setup(SetupStatus::Failed, Some(UserFacingError::from(&e)))
            }
        }
    }

    async fn open_device(&self, position: CameraPosition) -> Option<CaptureDevice> {
        let hardware = Arc::clone(&self.hardware);

        match tokio::task::spawn_blocking(move || hardware.open(position)).await {
            Ok(Ok(Some(device))) => {
                debug!("Opened {} camera: {}", position.as_str(), device.name);
                Some(device)
            }
            Ok(Ok(None)) => {
                debug!("No {} camera present", position.as_str());
                None
            }
            Ok(Err(e)) => {
                warn!("Could not open {} camera: {}", position.as_str(), e);
                None
            }
            Err(e) => {
                warn!("Opening {} camera panicked or was cancelled: {}", position.as_str(), e);
                None
            }
        }
    }

    /// Attach the default device and the video output in one configuration
    fn attach_devices(
        &self,
        back: Option<CaptureDevice>,
        front: Option<CaptureDevice>,
    ) -> Result<CameraPosition, CameraError> {
        let default_device = back
            .clone()
            .or_else(|| front.clone())
            .ok_or(CameraError::DeviceUnavailable)?;
        let active = default_device.position;

        {
            let mut bracket = self.session.configure();
            bracket.set_preset(self.config.preset);
            bracket.add_input(default_device)?;
            self.configure_output(&mut bracket, active)?;
        }

        let mut state = self.state.lock();
        state.back = back;
        state.front = front;
        state.active = Some(active);
        Ok(active)
    }

    fn configure_output(
        &self,
        bracket: &mut ConfigurationBracket<'_>,
        active: CameraPosition,
    ) -> Result<(), CameraError> {
        if !bracket.can_add_output() {
            return Err(CameraError::CannotAddOutput);
        }

        bracket.add_output(OutputConnection {
            orientation: VideoOrientation::Portrait,
            mirrored: active == CameraPosition::Front,
        })
    }

    fn finish_setup(&self, status: SetupStatus, user_error: Option<UserFacingError>) -> SetupStatus {
        {
            let mut state = self.state.lock();
            state.setup_status = status;
            if user_error.is_some() {
                state.last_error = user_error;
            }
        }

        if let Some(user_error) = user_error {
            self.state_handle.send(StateUpdate::Error(user_error));
        }
        self.state_handle.send(StateUpdate::CameraSetup(status));
        status
    }

    /// Start the capture session. No-op unless setup succeeded and capture is stopped.
    pub async fn start(&self) -> RunStatus {
        let _guard = self.run_lock.lock().await;

        if self.setup_status() != SetupStatus::Success || self.run_status() != RunStatus::Stopped {
            debug!("Ignoring start request in state {:?}/{:?}", self.setup_status(), self.run_status());
            return self.run_status();
        }

        self.set_run_status(RunStatus::Loading);
        info!("Starting capture session");

        let session = Arc::clone(&self.session);
        let outcome = match tokio::task::spawn_blocking(move || session.start_running()).await {
            Ok(result) => result,
            Err(e) => Err(CameraError::Task {
                details: e.to_string(),
            }),
        };

        match outcome {
            Ok(()) => {
                self.set_run_status(RunStatus::Running);
                info!("Capture session started");
            }
            Err(e) => {
                error!("Failed to start capture session: {}", e);
                self.set_run_status(RunStatus::Stopped);
                let user_error = UserFacingError::from(&e);
                self.state.lock().last_error = Some(user_error);
                self.state_handle.send(StateUpdate::Error(user_error));
            }
        }

        self.run_status()
    }

    /// Stop the capture session. No-op unless setup succeeded and capture is running.
    pub async fn stop(&self) -> RunStatus {
        let _guard = self.run_lock.lock().await;

        if self.setup_status() != SetupStatus::Success || self.run_status() != RunStatus::Running {
            debug!("Ignoring stop request in state {:?}/{:?}", self.setup_status(), self.run_status());
            return self.run_status();
        }

        self.set_run_status(RunStatus::Loading);
        info!("Stopping capture session");

        let session = Arc::clone(&self.session);
        if let Err(e) = tokio::task::spawn_blocking(move || session.stop_running()).await {
            warn!("Capture session stop task failed: {}", e);
        }

        self.set_run_status(RunStatus::Stopped);
        info!("Capture session stopped");
        RunStatus::Stopped
    }

    /// Swap the active input between the front and back cameras.
    ///
    /// Returns the new active position, or `None` when there was nothing to
    /// switch to.
    pub fn switch_camera(&self) -> Option<CameraPosition> {
        let mut state = self.state.lock();

        let (Some(front), Some(back)) = (state.front.clone(), state.back.clone()) else {
            debug!("Switch camera ignored: both cameras are required");
            return None;
        };
        let current = state.active?;
        let (from, to) = match current {
            CameraPosition::Front => (front, back),
            CameraPosition::Back => (back, front),
        };

        {
            let mut bracket = self.session.configure();
            bracket.remove_input(from.position);
            if let Err(e) = bracket.add_input(to.clone()) {
                warn!("Switch camera failed, restoring {} camera: {}", from.position.as_str(), e);
                if let Err(e) = bracket.add_input(from) {
                    error!("Could not restore previous camera input: {}", e);
                }
                return None;
            }
            if let Some(connection) = bracket.connection_mut() {
                connection.mirrored = to.position == CameraPosition::Front;
            }
        }

        state.active = Some(to.position);
        let config = SessionConfig::derive(self.config.preset, state.active, state.preview_orientation);
        drop(state);

        info!("Switched to {} camera", to.position.as_str());
        self.state_handle.send(StateUpdate::ActiveCamera {
            position: to.position,
            config,
        });
        Some(to.position)
    }

    /// Record a new preview orientation and return the recomputed session config
    pub fn set_preview_orientation(&self, orientation: VideoOrientation) -> SessionConfig {
        let config = {
            let mut state = self.state.lock();
            state.preview_orientation = orientation;
            SessionConfig::derive(self.config.preset, state.active, orientation)
        };
        self.state_handle.send(StateUpdate::SessionConfig(config));
        config
    }

    fn set_run_status(&self, status: RunStatus) {
        self.run_status.send_replace(status);
        self.state_handle.send(StateUpdate::RunStatus(status));
    }

    pub fn setup_status(&self) -> SetupStatus {
        self.state.lock().setup_status
    }

    pub fn run_status(&self) -> RunStatus {
        *self.run_status.borrow()
    }

    /// Subscribe to run status changes
    pub fn run_status_watch(&self) -> watch::Receiver<RunStatus> {
        self.run_status.subscribe()
    }

    pub fn active_camera(&self) -> Option<CameraPosition> {
        self.state.lock().active
    }

    pub fn last_error(&self) -> Option<UserFacingError> {
        self.state.lock().last_error
    }

    pub fn session_config(&self) -> SessionConfig {
        let state = self.state.lock();
        SessionConfig::derive(self.config.preset, state.active, state.preview_orientation)
    }

    pub fn session(&self) -> Arc<CaptureSession> {
        Arc::clone(&self.session)
    }
}
