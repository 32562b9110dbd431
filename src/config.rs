use crate::frame::{CameraPosition, FrameFormat, SessionPreset};
use crate::permission::AuthorizationStatus;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Minimum arg-max probability for a candidate to be published
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.30;

/// Highest frame rate a capture output is configured for
pub const MAX_FPS: u32 = 240;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LiveLabelConfig {
    pub camera: CameraConfig,
    pub classifier: ClassifierConfig,
    pub presentation: PresentationConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Session resolution/quality preset
    #[serde(default = "default_camera_preset")]
    pub preset: SessionPreset,

    /// Frames per second delivered by the capture output
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Pixel layout of delivered frames
    #[serde(default = "default_camera_format")]
    pub format: FrameFormat,

    /// Built-in cameras present on the (simulated) device
    #[serde(default = "default_camera_devices")]
    pub devices: Vec<CameraPosition>,

    /// Authorization state reported by the (simulated) platform
    #[serde(default = "default_camera_permission")]
    pub permission: AuthorizationStatus,

    /// Answer given when the user is prompted for access
    #[serde(default = "default_grant_on_request")]
    pub grant_on_request: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Primary location of the bundled model asset
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Secondary location, tried when the primary is absent
    #[serde(default = "default_fallback_model_path")]
    pub fallback_model_path: PathBuf,

    /// Minimum arg-max probability for a result to be published
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PresentationConfig {
    /// Delay after an orientation change before the preview is updated
    #[serde(default = "default_orientation_settle_ms")]
    pub orientation_settle_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Upper bound on waiting for the capture session to stop
    #[serde(default = "default_stop_timeout_seconds")]
    pub stop_timeout_seconds: u64,
}

impl LiveLabelConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_layered(path, Self::environment())
    }

    /// Environment overrides, e.g. LIVELABEL_CAMERA__FPS or LIVELABEL_CLASSIFIER__CONFIDENCE_THRESHOLD
    fn environment() -> Environment {
        Environment::with_prefix("LIVELABEL")
            .prefix_separator("_")
            .separator("__")
    }

    fn load_layered<P: AsRef<Path>>(path: P, environment: Environment) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let defaults = Config::try_from(&Self::default())?;

        let settings = Config::builder()
            .add_source(defaults)
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            .add_source(environment)
            .build()?;

        let config: LiveLabelConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.fps == 0 || self.camera.fps > MAX_FPS {
            return Err(ConfigError::Message(format!(
                "Camera fps must be between 1 and {}, got {}",
                MAX_FPS, self.camera.fps
            )));
        }

        let (width, height) = self.camera.preset.dimensions();
        if width == 0 || height == 0 {
            return Err(ConfigError::Message(
                "Camera preset resolution must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.confidence_threshold) {
            return Err(ConfigError::Message(format!(
                "Confidence threshold must be within [0, 1], got {}",
                self.classifier.confidence_threshold
            )));
        }

        if self.classifier.model_path.as_os_str().is_empty()
            || self.classifier.fallback_model_path.as_os_str().is_empty()
        {
            return Err(ConfigError::Message(
                "Model paths must not be empty".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for LiveLabelConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                preset: default_camera_preset(),
                fps: default_camera_fps(),
                format: default_camera_format(),
                devices: default_camera_devices(),
                permission: default_camera_permission(),
                grant_on_request: default_grant_on_request(),
            },
            classifier: ClassifierConfig {
                model_path: default_model_path(),
                fallback_model_path: default_fallback_model_path(),
                confidence_threshold: default_confidence_threshold(),
            },
            presentation: PresentationConfig {
                orientation_settle_ms: default_orientation_settle_ms(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                stop_timeout_seconds: default_stop_timeout_seconds(),
            },
        }
    }
}

// Default value functions
fn default_camera_preset() -> SessionPreset {
    SessionPreset::High
}
fn default_camera_fps() -> u32 {
    30
}
fn default_camera_format() -> FrameFormat {
    FrameFormat::Bgra32
}
fn default_camera_devices() -> Vec<CameraPosition> {
    vec![CameraPosition::Back, CameraPosition::Front]
}
fn default_camera_permission() -> AuthorizationStatus {
    AuthorizationStatus::Authorized
}
fn default_grant_on_request() -> bool {
    true
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/Resnet50.mlmodelc/model.json")
}
fn default_fallback_model_path() -> PathBuf {
    PathBuf::from("Resnet50.json")
}
fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_orientation_settle_ms() -> u64 {
    500
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_stop_timeout_seconds() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = LiveLabelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classifier.confidence_threshold, 0.30);
        assert_eq!(config.camera.devices, vec![CameraPosition::Back, CameraPosition::Front]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LiveLabelConfig::default();
        config.camera.fps = 0;
        assert!(config.validate().is_err());

        config.camera.fps = MAX_FPS + 1;
        assert!(config.validate().is_err());

        config.camera.fps = MAX_FPS;
        assert!(config.validate().is_ok());

        config.camera.fps = 15;
        config.classifier.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        config.classifier.confidence_threshold = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[camera]
fps = 12
devices = ["front"]
permission = "denied"

[classifier]
confidence_threshold = 0.5
"#
        )
        .unwrap();

        let config = LiveLabelConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.fps, 12);
        assert_eq!(config.camera.devices, vec![CameraPosition::Front]);
        assert_eq!(config.camera.permission, AuthorizationStatus::Denied);
        assert_eq!(config.classifier.confidence_threshold, 0.5);
        assert_eq!(config.presentation.orientation_settle_ms, 500);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[camera]\nfps = 12").unwrap();

        let environment = LiveLabelConfig::environment().source(Some(
            [
                ("LIVELABEL_CAMERA__FPS", "7"),
                ("LIVELABEL_CLASSIFIER__CONFIDENCE_THRESHOLD", "0.45"),
                ("OTHERAPP_CAMERA__FPS", "99"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ));

        let config = LiveLabelConfig::load_layered(file.path(), environment).unwrap();
        assert_eq!(config.camera.fps, 7);
        assert_eq!(config.classifier.confidence_threshold, 0.45);
        assert_eq!(config.system.event_bus_capacity, 100);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = LiveLabelConfig::load_from_file("/nonexistent/livelabel.toml").unwrap();
        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.camera.preset, SessionPreset::High);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = LiveLabelConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[classifier]"));
        let parsed: LiveLabelConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.camera.fps, 30);
    }
}
