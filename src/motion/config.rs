//! Motion loop configuration.

use crate::analysis::DarknessConfig;
use crate::capture::CaptureConfig;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Detector and loop tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Samples kept in the background window (N).
    pub background_size: usize,
    /// Frames kept in the image queue (M, odd).
    pub queue_size: usize,
    /// Deviation in standard deviations before a value is foreground.
    pub sigma: f32,
    /// Foreground fraction above which an event fires.
    pub event_threshold: f64,
    /// Frames between darkness and disk checks.
    pub heartbeat: u64,
    /// Analysis width in pixels.
    pub analysis_width: u32,
    /// Analysis height in pixels.
    pub analysis_height: u32,
    /// Stop when free space drops below this many gigabytes.
    pub min_free_gb: f64,
    /// Capture retries before a failure is fatal.
    pub capture_retries: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            background_size: 60,
            queue_size: 3,
            sigma: 4.0,
            event_threshold: 0.0025,
            heartbeat: 2,
            analysis_width: 160,
            analysis_height: 120,
            min_free_gb: 0.5,
            capture_retries: 1,
        }
    }
}

impl MotionConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.background_size < 1 {
            return Err(ConfigError::InvalidBackgroundSize);
        }
        if self.queue_size < 1 || self.queue_size % 2 == 0 {
            return Err(ConfigError::InvalidQueueSize(self.queue_size));
        }
        // The last M warm-up frames seed the queue.
        if self.queue_size > self.background_size {
            return Err(ConfigError::QueueLargerThanBackground {
                queue: self.queue_size,
                background: self.background_size,
            });
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(ConfigError::InvalidSigma(self.sigma));
        }
        if !(0.0..=1.0).contains(&self.event_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.event_threshold));
        }
        if self.heartbeat < 1 {
            return Err(ConfigError::InvalidHeartbeat);
        }
        if self.analysis_width == 0 || self.analysis_height == 0 {
            return Err(ConfigError::InvalidAnalysisResolution);
        }
        if !self.min_free_gb.is_finite() || self.min_free_gb < 0.0 {
            return Err(ConfigError::InvalidMinFreeSpace(self.min_free_gb));
        }
        Ok(())
    }
}

/// Everything the motion loop needs to be constructed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopConfig {
    /// Camera settings.
    pub capture: CaptureConfig,
    /// Detection and loop settings.
    pub motion: MotionConfig,
    /// Darkness handling.
    pub darkness: DarknessConfig,
}

impl LoopConfig {
    /// Validates all sections; called before warm-up begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.motion.validate()?;
        self.darkness.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        assert!(MotionConfig::default().validate().is_ok());
        assert!(LoopConfig::default().validate().is_ok());
    }

    #[test]
    fn test_queue_must_be_odd() {
        let config = MotionConfig {
            queue_size: 2,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidQueueSize(2)));

        let config = MotionConfig {
            queue_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidQueueSize(0)));
    }

    #[test]
    fn test_empty_background_rejected() {
        let config = MotionConfig {
            background_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBackgroundSize));
    }

    #[test]
    fn test_queue_larger_than_background_rejected() {
        let config = MotionConfig {
            background_size: 3,
            queue_size: 5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QueueLargerThanBackground { queue: 5, background: 3 })
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        for bad in [-0.1, 1.01, f64::NAN] {
            let config = MotionConfig {
                event_threshold: bad,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::ThresholdOutOfRange(_))
            ));
        }
    }

    #[test]
    fn test_zero_sigma_rejected() {
        let config = MotionConfig {
            sigma: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidSigma(0.0)));
    }
}
