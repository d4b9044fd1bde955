//! Storage configuration.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How persisted frames are handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePolicy {
    /// Save inline before the next capture.
    #[default]
    Blocking,
    /// Save on a dedicated worker thread.
    Background,
}

/// Where and how event frames are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for all artifacts.
    pub root: PathBuf,
    /// Subdirectory for full-resolution event frames.
    pub events_dir: String,
    /// Subdirectory for downscaled previews.
    pub previews_dir: String,
    /// Previews are the frame dimensions divided by this.
    pub preview_divisor: u32,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// Inline or background saving.
    pub policy: SavePolicy,
    /// Frames that may wait for the background worker.
    pub queue_depth: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            events_dir: "events".into(),
            previews_dir: "previews".into(),
            preview_divisor: 3,
            jpeg_quality: 90,
            policy: SavePolicy::Blocking,
            queue_depth: 8,
        }
    }
}

impl StorageConfig {
    /// Full path of the events directory.
    pub fn events_path(&self) -> PathBuf {
        self.root.join(&self.events_dir)
    }

    /// Full path of the previews directory.
    pub fn previews_path(&self) -> PathBuf {
        self.root.join(&self.previews_dir)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview_divisor == 0 {
            return Err(ConfigError::InvalidPreviewDivisor);
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidJpegQuality(self.jpeg_quality));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidQueueDepth);
        }
        Ok(())
    }
}
