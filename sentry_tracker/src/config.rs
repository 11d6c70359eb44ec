//! Configuration parsing and management for the tracker

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sentry_server::ServerConfig;
use sentry_vision::{ConfigError, VisionConfig};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub capture: CaptureConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, ConfigError> {
        let paths = [PathBuf::from("sentry.toml"), PathBuf::from("config/sentry.toml")];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.vision.validate()?;

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.width/height".to_string(),
                message: "Frame size must be greater than 0".to_string(),
            });
        }

        if self.capture.cadence_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.cadence_ms".to_string(),
                message: "Cadence must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Frame capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target time between cycles in milliseconds
    pub cadence_ms: u64,
    /// Frame width for synthetic frames
    pub width: u32,
    /// Frame height for synthetic frames
    pub height: u32,
    /// Directory of PNG/JPEG frames to loop over instead of a synthetic scene
    pub frames_dir: Option<PathBuf>,
}

impl CaptureConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 33,
            width: 640,
            height: 480,
            frames_dir: None,
        }
    }
}
