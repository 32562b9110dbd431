use super::device::{CaptureDevice, CaptureHardware};
use crate::error::CameraError;
use crate::frame::{CameraPosition, FrameFormat, RawFrame, SessionPreset, VideoOrientation};
use crate::frame_slot::FrameSender;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Settings of the video data output connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConnection {
    pub orientation: VideoOrientation,
    pub mirrored: bool,
}

#[derive(Debug)]
struct SessionTopology {
    preset: SessionPreset,
    inputs: Vec<CaptureDevice>,
    output: Option<OutputConnection>,
}

/// Hardware-facing session coordinating camera inputs and the frame output.
///
/// The topology is only mutated through a [`ConfigurationBracket`], which
/// holds the write side of the topology lock. Frame delivery takes the read
/// side, so no frame is produced from a half-configured session.
pub struct CaptureSession {
    hardware: Arc<dyn CaptureHardware>,
    topology: RwLock<SessionTopology>,
    sink: FrameSender,
    self_ref: Weak<CaptureSession>,
    generation: AtomicU64,
    frame_counter: AtomicU64,
    is_running: AtomicBool,
}

impl CaptureSession {
    pub fn new(hardware: Arc<dyn CaptureHardware>, sink: FrameSender) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            hardware,
            topology: RwLock::new(SessionTopology {
                preset: SessionPreset::High,
                inputs: Vec::new(),
                output: None,
            }),
            sink,
            self_ref: self_ref.clone(),
            generation: AtomicU64::new(0),
            frame_counter: AtomicU64::new(0),
            is_running: AtomicBool::new(false),
        })
    }

    /// Begin a configuration change; committed when the bracket is dropped
    pub fn configure(&self) -> ConfigurationBracket<'_> {
        trace!("Beginning capture session configuration");
        ConfigurationBracket {
            session: self,
            topology: self.topology.write(),
        }
    }

    /// Start the hardware. Blocks until it runs.
    pub fn start_running(&self) -> Result<(), CameraError> {
        let feed = FrameFeed {
            session: self.self_ref.clone(),
        };
        self.hardware.start(feed)?;
        self.is_running.store(true, Ordering::Release);
        debug!("Capture session running");
        Ok(())
    }

    /// Stop the hardware. Blocks until it has stopped.
    ///
    /// A frame still waiting in the output is dropped; it belongs to the
    /// stopped run.
    pub fn stop_running(&self) {
        self.hardware.stop();
        self.is_running.store(false, Ordering::Release);
        self.sink.clear();
        debug!("Capture session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Positions of the attached inputs
    pub fn inputs(&self) -> Vec<CameraPosition> {
        self.topology.read().inputs.iter().map(|d| d.position).collect()
    }

    pub fn output_connection(&self) -> Option<OutputConnection> {
        self.topology.read().output
    }

    pub fn preset(&self) -> SessionPreset {
        self.topology.read().preset
    }

    /// Number of committed configuration changes
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of frames handed to the output so far
    pub fn frames_delivered(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    fn deliver(&self, data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> bool {
        let topology = self.topology.read();

        let Some(connection) = topology.output else {
            trace!("Dropping frame: no output attached");
            return false;
        };
        if topology.inputs.is_empty() {
            trace!("Dropping frame: no input attached");
            return false;
        }

        let id = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let mut frame = RawFrame::new(id, SystemTime::now(), data, width, height, format);
        frame.mirrored = connection.mirrored;
        frame.orientation = connection.orientation;

        // The slot keeps only the newest frame: late frames are discarded
        self.sink.send(frame);
        true
    }
}

/// Exclusive begin/commit bracket around session mutations.
///
/// Committing happens on drop, so early returns still release the session.
pub struct ConfigurationBracket<'a> {
    session: &'a CaptureSession,
    topology: RwLockWriteGuard<'a, SessionTopology>,
}

impl ConfigurationBracket<'_> {
    pub fn set_preset(&mut self, preset: SessionPreset) {
        self.topology.preset = preset;
    }

    pub fn can_add_input(&self, device: &CaptureDevice) -> bool {
        !self
            .topology
            .inputs
            .iter()
            .any(|d| d.position == device.position)
            && self.session.hardware.accepts_input(device)
    }

    pub fn add_input(&mut self, device: CaptureDevice) -> Result<(), CameraError> {
        if !self.can_add_input(&device) {
            return Err(CameraError::CannotAddInput {
                position: device.position,
            });
        }
        debug!("Adding {} camera input ({})", device.position.as_str(), device.name);
        self.topology.inputs.push(device);
        Ok(())
    }

    /// Detach the input at `position`, returning it if it was attached
    pub fn remove_input(&mut self, position: CameraPosition) -> Option<CaptureDevice> {
        let index = self
            .topology
            .inputs
            .iter()
            .position(|d| d.position == position)?;
        debug!("Removing {} camera input", position.as_str());
        Some(self.topology.inputs.remove(index))
    }

    pub fn can_add_output(&self) -> bool {
        self.topology.output.is_none() && self.session.hardware.accepts_output()
    }

    pub fn add_output(&mut self, connection: OutputConnection) -> Result<(), CameraError> {
        if !self.can_add_output() {
            return Err(CameraError::CannotAddOutput);
        }
        self.topology.output = Some(connection);
        Ok(())
    }

    pub fn connection_mut(&mut self) -> Option<&mut OutputConnection> {
        self.topology.output.as_mut()
    }
}

impl Drop for ConfigurationBracket<'_> {
    fn drop(&mut self) {
        let generation = self.session.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            "Committed capture session configuration (generation {}, inputs: {:?}, output: {:?})",
            generation,
            self.topology
                .inputs
                .iter()
                .map(|d| d.position.as_str())
                .collect::<Vec<_>>(),
            self.topology.output
        );
    }
}

/// Handle through which the hardware pushes frames into the session.
///
/// Delivery is serialized by the hardware (one callback thread per output).
#[derive(Clone)]
pub struct FrameFeed {
    session: Weak<CaptureSession>,
}

impl FrameFeed {
    pub fn for_session(session: &Arc<CaptureSession>) -> Self {
        Self {
            session: Arc::downgrade(session),
        }
    }

    /// Push one frame. Returns false when it was dropped.
    pub fn deliver(&self, data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> bool {
        match self.session.upgrade() {
            Some(session) => session.deliver(data, width, height, format),
            None => false,
        }
    }
}
