//! Configuration file loading and validation.
//!
//! Every tunable lives in a section struct owned by the module that uses
//! it; `FileConfig` only aggregates them so a whole appliance can be
//! described in one TOML file. Every section is optional.

use crate::analysis::DarknessConfig;
use crate::capture::CaptureConfig;
use crate::motion::{LoopConfig, MotionConfig};
use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Channel count is neither 1 nor 3.
    #[error("invalid channel count {0} (must be 1 or 3)")]
    InvalidChannels(u8),
    /// Frame rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Background window is empty.
    #[error("background window size must be at least 1")]
    InvalidBackgroundSize,
    /// Image queue size is even or zero.
    #[error("image queue size {0} must be odd and at least 1")]
    InvalidQueueSize(usize),
    /// The warm-up cannot seed a queue larger than the window.
    #[error("image queue size {queue} exceeds background window size {background}")]
    QueueLargerThanBackground {
        /// Requested queue size.
        queue: usize,
        /// Requested background window size.
        background: usize,
    },
    /// Sigma is not a positive finite number.
    #[error("sigma {0} must be finite and positive")]
    InvalidSigma(f32),
    /// Event threshold outside `[0, 1]`.
    #[error("event threshold {0} outside [0, 1]")]
    ThresholdOutOfRange(f64),
    /// Heartbeat of zero frames.
    #[error("heartbeat must be at least 1 frame")]
    InvalidHeartbeat,
    /// Analysis width or height is zero.
    #[error("invalid analysis resolution")]
    InvalidAnalysisResolution,
    /// Minimum free space is negative or not finite.
    #[error("minimum free space {0} GB must be finite and non-negative")]
    InvalidMinFreeSpace(f64),
    /// Darkness cutoff is negative or not finite.
    #[error("darkness cutoff {0} must be finite and non-negative")]
    InvalidDarknessCutoff(f64),
    /// Preview divisor of zero.
    #[error("preview divisor must be at least 1")]
    InvalidPreviewDivisor,
    /// JPEG quality outside 1-100.
    #[error("JPEG quality {0} outside 1-100")]
    InvalidJpegQuality(u8),
    /// Background save queue depth of zero.
    #[error("save queue depth must be at least 1")]
    InvalidQueueDepth,
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Metrics and status endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// HTTP port for `/metrics` and `/status` (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Camera settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Detection and loop settings.
    #[serde(default)]
    pub motion: MotionConfig,
    /// Darkness handling.
    #[serde(default)]
    pub darkness: DarknessConfig,
    /// Where and how events are saved.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metrics endpoint settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FileConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loop_config().validate()?;
        self.storage.validate()
    }

    /// The subset of settings the motion loop consumes.
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            capture: self.capture.clone(),
            motion: self.motion.clone(),
            darkness: self.darkness.clone(),
        }
    }
}
