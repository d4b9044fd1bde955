//! Darkness detection and power-saving cadence.
//!
//! Brightness is checked every `heartbeat` frames, and on every frame while
//! the scene is known to be dark. The governor only decides; the motion
//! loop carries out the sleep and powers the source down and back up.

use super::preprocess::Sample;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How brightness is derived from a sample.
///
/// Cutoffs are empirical and only meaningful for the metric they were tuned
/// against, so both are configured together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessMetric {
    /// Raw sum of every analysis value.
    Sum,
    /// Mean intensity on the 0..255 scale.
    #[default]
    Mean,
    /// `ln(1 + mean)`.
    LogMean,
}

impl BrightnessMetric {
    /// Measures the brightness of `sample`.
    pub fn measure(self, sample: &Sample) -> f64 {
        match self {
            BrightnessMetric::Sum => sample.sum(),
            BrightnessMetric::Mean => sample.mean(),
            BrightnessMetric::LogMean => sample.mean().ln_1p(),
        }
    }
}

/// Darkness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarknessConfig {
    /// Brightness metric.
    pub metric: BrightnessMetric,
    /// Brightness below this value counts as dark.
    pub cutoff: f64,
    /// Seconds to sleep per dark check.
    pub sleep_secs: u64,
    /// Close the frame source while sleeping.
    pub power_down: bool,
}

impl Default for DarknessConfig {
    fn default() -> Self {
        Self {
            metric: BrightnessMetric::Mean,
            cutoff: 12.0,
            sleep_secs: 600,
            power_down: true,
        }
    }
}

impl DarknessConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cutoff.is_finite() || self.cutoff < 0.0 {
            return Err(ConfigError::InvalidDarknessCutoff(self.cutoff));
        }
        Ok(())
    }
}

/// Outcome of one brightness check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DarknessCheck {
    /// Brightness of the checked sample under the configured metric.
    pub brightness: f64,
    /// Whether the brightness fell below the cutoff.
    pub dark: bool,
}

/// Tracks whether the scene is too dark to bother capturing.
#[derive(Debug, Clone)]
pub struct DarknessGovernor {
    config: DarknessConfig,
    heartbeat: u64,
    too_dark: bool,
}

impl DarknessGovernor {
    /// Creates a governor that checks every `heartbeat` images while light.
    pub fn new(config: DarknessConfig, heartbeat: u64) -> Self {
        Self {
            config,
            heartbeat: heartbeat.max(1),
            too_dark: false,
        }
    }

    /// Whether a check should run for the frame with this counter value.
    pub fn is_due(&self, image_counter: u64) -> bool {
        self.too_dark || image_counter % self.heartbeat == 0
    }

    /// Measures `sample` and updates the dark flag.
    pub fn evaluate(&mut self, sample: &Sample) -> DarknessCheck {
        let brightness = self.config.metric.measure(sample);
        let dark = brightness < self.config.cutoff;

        if dark && !self.too_dark {
            tracing::info!(
                brightness,
                cutoff = self.config.cutoff,
                "Scene too dark, entering darkness mode"
            );
        } else if !dark && self.too_dark {
            tracing::info!(brightness, "Light level recovered, leaving darkness mode");
        }

        self.too_dark = dark;
        DarknessCheck { brightness, dark }
    }

    /// Whether the last check found the scene too dark.
    pub fn is_dark(&self) -> bool {
        self.too_dark
    }

    /// How long to sleep per dark check.
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.config.sleep_secs)
    }

    /// Whether the frame source is closed while sleeping.
    pub fn power_down(&self) -> bool {
        self.config.power_down
    }

    /// The darkness configuration.
    pub fn config(&self) -> &DarknessConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(heartbeat: u64) -> DarknessGovernor {
        DarknessGovernor::new(DarknessConfig::default(), heartbeat)
    }

    #[test]
    fn test_metrics() {
        let sample = Sample::from_values(2, 1, 1, vec![0.0, 2.0]);
        assert_eq!(BrightnessMetric::Sum.measure(&sample), 2.0);
        assert_eq!(BrightnessMetric::Mean.measure(&sample), 1.0);
        assert!((BrightnessMetric::LogMean.measure(&sample) - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_heartbeat_cadence() {
        let gov = governor(3);
        assert!(gov.is_due(0));
        assert!(!gov.is_due(1));
        assert!(!gov.is_due(2));
        assert!(gov.is_due(3));
    }

    #[test]
    fn test_dark_checks_every_frame() {
        let mut gov = governor(10);
        let check = gov.evaluate(&Sample::filled(2, 2, 1, 1.0));
        assert!(check.dark);
        assert!(gov.is_due(7));

        let check = gov.evaluate(&Sample::filled(2, 2, 1, 200.0));
        assert!(!check.dark);
        assert!(!gov.is_due(7));
    }

    #[test]
    fn test_cutoff_is_strict() {
        let mut gov = governor(1);
        let check = gov.evaluate(&Sample::filled(2, 2, 1, 12.0));
        assert!(!check.dark);
    }

    #[test]
    fn test_negative_cutoff_rejected() {
        let config = DarknessConfig {
            cutoff: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDarknessCutoff(_))
        ));
    }
}
