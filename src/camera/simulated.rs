use super::device::{CaptureDevice, CaptureHardware};
use super::session::FrameFeed;
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{CameraPosition, FrameFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Colours cycled through by the synthetic feed, one per second
const PALETTE: [[u8; 3]; 6] = [
    [201, 132, 70],
    [40, 70, 190],
    [30, 150, 60],
    [220, 220, 210],
    [180, 30, 40],
    [90, 90, 95],
];

/// Camera hardware stand-in that synthesizes solid-colour frames.
///
/// Frames are produced on a dedicated thread at the configured rate, the
/// same way a platform delivers them on its own callback queue.
pub struct SimulatedCamera {
    present: Vec<CameraPosition>,
    fps: u32,
    format: FrameFormat,
    dimensions: (u32, u32),
    open_calls: AtomicU32,
    worker: Mutex<Option<(Arc<AtomicBool>, JoinHandle<()>)>>,
}

impl SimulatedCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self::with_devices(config.devices.clone(), config.fps, config.format, config.preset.dimensions())
    }

    pub fn with_devices(
        present: Vec<CameraPosition>,
        fps: u32,
        format: FrameFormat,
        dimensions: (u32, u32),
    ) -> Self {
        Self {
            present,
            fps: fps.max(1),
            format,
            dimensions,
            open_calls: AtomicU32::new(0),
            worker: Mutex::new(None),
        }
    }

    /// How many times device-open was attempted
    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::Relaxed)
    }

    pub fn is_streaming(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn render(format: FrameFormat, (width, height): (u32, u32), rgb: [u8; 3]) -> Vec<u8> {
        let pixels = width as usize * height as usize;
        match format {
            FrameFormat::Rgb24 => rgb.repeat(pixels),
            FrameFormat::Bgra32 => [rgb[2], rgb[1], rgb[0], 255].repeat(pixels),
            FrameFormat::Mjpeg => {
                let image = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
                let mut encoded = Vec::new();
                let result = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 80)
                    .encode_image(&image);
                match result {
                    Ok(()) => encoded,
                    Err(e) => {
                        warn!("Synthetic JPEG encoding failed: {}", e);
                        Vec::new()
                    }
                }
            }
        }
    }
}

impl CaptureHardware for SimulatedCamera {
    fn open(&self, position: CameraPosition) -> Result<Option<CaptureDevice>, CameraError> {
        self.open_calls.fetch_add(1, Ordering::Relaxed);

        if !self.present.contains(&position) {
            return Ok(None);
        }

        Ok(Some(CaptureDevice::new(
            position,
            Uuid::new_v4().to_string(),
            format!("Simulated {} camera", position.as_str()),
        )))
    }

    fn start(&self, feed: FrameFeed) -> Result<(), CameraError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("Simulated camera already streaming");
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let frame_interval = Duration::from_micros(1_000_000 / self.fps as u64);
        let frames_per_colour = self.fps as u64;
        let format = self.format;
        let dimensions = self.dimensions;

        let handle = std::thread::Builder::new()
            .name("simulated-camera".to_string())
            .spawn(move || {
                let mut tick = 0u64;
                while !stop_flag.load(Ordering::Acquire) {
                    let colour = PALETTE[((tick / frames_per_colour) % PALETTE.len() as u64) as usize];
                    let data = SimulatedCamera::render(format, dimensions, colour);
                    if !feed.deliver(data, dimensions.0, dimensions.1, format) {
                        trace!("Simulated frame {} dropped by session", tick);
                    }
                    tick += 1;
                    std::thread::sleep(frame_interval);
                }
                debug!("Simulated camera thread exiting after {} frames", tick);
            })
            .map_err(|e| CameraError::Start {
                details: e.to_string(),
            })?;

        *worker = Some((stop, handle));
        info!(
            "Simulated camera streaming {}x{} {:?} @ {}fps",
            dimensions.0, dimensions.1, format, self.fps
        );
        Ok(())
    }

    fn stop(&self) {
        let Some((stop, handle)) = self.worker.lock().take() else {
            return;
        };

        stop.store(true, Ordering::Release);
        if handle.join().is_err() {
            warn!("Simulated camera thread panicked");
        }
        info!("Simulated camera stopped");
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
