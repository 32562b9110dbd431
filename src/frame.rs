use crate::error::FrameError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Physical placement of a built-in camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    Back,
}

impl CameraPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraPosition::Front => "front",
            CameraPosition::Back => "back",
        }
    }
}

/// Pixel layout of a raw frame as delivered by the capture hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit BGRA, the native layout of mobile capture outputs
    Bgra32,
    /// Motion JPEG - compressed JPEG frames
    Mjpeg,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Rgb24 => 3,
            FrameFormat::Bgra32 => 4,
            FrameFormat::Mjpeg => 0, // Variable size, compressed
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Resolution/quality preset of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPreset {
    Low,
    Medium,
    High,
    Vga640x480,
}

impl SessionPreset {
    /// Frame dimensions produced under this preset
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            SessionPreset::Low => (192, 144),
            SessionPreset::Medium => (480, 360),
            SessionPreset::High => (1280, 720),
            SessionPreset::Vga640x480 => (640, 480),
        }
    }
}

/// Orientation of a capture connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

/// Physical orientation reported by the device motion sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceOrientation {
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

impl DeviceOrientation {
    /// Connection orientation matching this device orientation.
    ///
    /// Device landscape is named after the home-button side while video
    /// landscape is named after the camera side, so the two swap. Flat and
    /// unknown orientations have no video counterpart.
    pub fn video_orientation(&self) -> Option<VideoOrientation> {
        match self {
            DeviceOrientation::Portrait => Some(VideoOrientation::Portrait),
            DeviceOrientation::PortraitUpsideDown => Some(VideoOrientation::PortraitUpsideDown),
            DeviceOrientation::LandscapeLeft => Some(VideoOrientation::LandscapeRight),
            DeviceOrientation::LandscapeRight => Some(VideoOrientation::LandscapeLeft),
            DeviceOrientation::Unknown | DeviceOrientation::FaceUp | DeviceOrientation::FaceDown => {
                None
            }
        }
    }
}

/// Capture configuration derived from the active device and the UI environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub preset: SessionPreset,
    /// True iff the active device is front-facing
    pub mirrored: bool,
    /// Orientation of the video data output; always portrait
    pub output_orientation: VideoOrientation,
    /// Orientation of the preview, follows the device
    pub preview_orientation: VideoOrientation,
}

impl SessionConfig {
    pub fn derive(
        preset: SessionPreset,
        active: Option<CameraPosition>,
        preview_orientation: VideoOrientation,
    ) -> Self {
        Self {
            preset,
            mirrored: active == Some(CameraPosition::Front),
            output_orientation: VideoOrientation::Portrait,
            preview_orientation,
        }
    }
}

/// A single frame handed over by the capture output.
///
/// Consumed once; the pixel data is shared so that the presenter and the
/// classifier can both read it without copying.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Mirroring requested by the output connection
    pub mirrored: bool,
    pub orientation: VideoOrientation,
}

impl RawFrame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
            mirrored: false,
            orientation: VideoOrientation::Portrait,
        }
    }

    /// Byte length of an uncompressed frame, `None` if it does not fit in memory
    pub fn expected_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.format.bytes_per_pixel())
    }
}

/// Decoded frame published to the presenter
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub id: u64,
    pub timestamp: SystemTime,
    pub image: Arc<RgbImage>,
}

/// Decode a raw frame into an RGB image, applying connection mirroring.
pub fn decode_frame(frame: &RawFrame) -> Result<RgbImage, FrameError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(FrameError::EmptyFrame { frame_id: frame.id });
    }

    if !frame.format.is_compressed() {
        let expected = frame.expected_size().ok_or_else(|| FrameError::Decode {
            frame_id: frame.id,
            details: format!("{}x{} frame is too large", frame.width, frame.height),
        })?;
        if frame.data.len() != expected {
            return Err(FrameError::SizeMismatch {
                frame_id: frame.id,
                expected,
                actual: frame.data.len(),
            });
        }
    }

    let image = match frame.format {
        FrameFormat::Rgb24 => RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
            .ok_or_else(|| FrameError::Decode {
                frame_id: frame.id,
                details: "RGB buffer does not match dimensions".to_string(),
            })?,
        FrameFormat::Bgra32 => {
            let rgb: Vec<u8> = frame
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect();
            RgbImage::from_raw(frame.width, frame.height, rgb).ok_or_else(|| {
                FrameError::Decode {
                    frame_id: frame.id,
                    details: "BGRA buffer does not match dimensions".to_string(),
                }
            })?
        }
        FrameFormat::Mjpeg => {
            image::load_from_memory_with_format(&frame.data, image::ImageFormat::Jpeg)
                .map_err(|e| FrameError::Decode {
                    frame_id: frame.id,
                    details: e.to_string(),
                })?
                .to_rgb8()
        }
    };

    if frame.mirrored {
        Ok(image::imageops::flip_horizontal(&image))
    } else {
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_rgb(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        (0..width * height).flat_map(|_| rgb).collect()
    }

    #[test]
    fn test_decode_rgb24() {
        let frame = RawFrame::new(1, SystemTime::now(), solid_rgb(4, 2, [10, 20, 30]), 4, 2, FrameFormat::Rgb24);
        let image = decode_frame(&frame).unwrap();
        assert_eq!(image.dimensions(), (4, 2));
        assert_eq!(image.get_pixel(3, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_bgra_swaps_channels() {
        let data: Vec<u8> = (0..4).flat_map(|_| [30u8, 20, 10, 255]).collect();
        let frame = RawFrame::new(2, SystemTime::now(), data, 2, 2, FrameFormat::Bgra32);
        let image = decode_frame(&frame).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_rejects_truncated_buffer() {
        let frame = RawFrame::new(3, SystemTime::now(), vec![0; 10], 4, 4, FrameFormat::Rgb24);
        assert!(matches!(
            decode_frame(&frame),
            Err(FrameError::SizeMismatch { expected: 48, actual: 10, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_dimensions() {
        let frame = RawFrame::new(6, SystemTime::now(), vec![0; 12], u32::MAX, u32::MAX, FrameFormat::Rgb24);
        assert!(matches!(decode_frame(&frame), Err(FrameError::Decode { frame_id: 6, .. })));

        let frame = RawFrame::new(7, SystemTime::now(), vec![0; 12], u32::MAX, u32::MAX, FrameFormat::Bgra32);
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage_jpeg() {
        let frame = RawFrame::new(4, SystemTime::now(), vec![1, 2, 3, 4], 2, 2, FrameFormat::Mjpeg);
        assert!(matches!(decode_frame(&frame), Err(FrameError::Decode { .. })));
    }

    #[test]
    fn test_decode_applies_mirroring() {
        let mut data = solid_rgb(2, 1, [0, 0, 0]);
        data[0..3].copy_from_slice(&[255, 0, 0]);
        let mut frame = RawFrame::new(5, SystemTime::now(), data, 2, 1, FrameFormat::Rgb24);
        frame.mirrored = true;

        let image = decode_frame(&frame).unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_session_config_mirrors_front_only() {
        let front = SessionConfig::derive(SessionPreset::High, Some(CameraPosition::Front), VideoOrientation::Portrait);
        let back = SessionConfig::derive(SessionPreset::High, Some(CameraPosition::Back), VideoOrientation::Portrait);
        assert!(front.mirrored);
        assert!(!back.mirrored);
        assert_eq!(front.output_orientation, VideoOrientation::Portrait);
    }

    #[test]
    fn test_device_orientation_mapping() {
        assert_eq!(
            DeviceOrientation::LandscapeLeft.video_orientation(),
            Some(VideoOrientation::LandscapeRight)
        );
        assert_eq!(DeviceOrientation::FaceUp.video_orientation(), None);
    }
}
