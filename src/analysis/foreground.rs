//! Foreground scoring against the background model.

use super::background::{BackgroundModel, PixelStats};
use super::preprocess::Sample;

/// Result of testing one sample against the background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Fraction of analysis values flagged as foreground, in `[0, 1]`.
    pub fraction: f64,
    /// Whether the fraction exceeded the event threshold.
    pub triggered: bool,
}

/// Scalar-threshold background subtraction.
///
/// A value is foreground when `|x - mean| > stdev * sigma`. Larger sigma
/// means fewer false positives and slower triggering.
#[derive(Debug, Clone)]
pub struct ForegroundDetector {
    sigma: f32,
    threshold: f64,
}

impl ForegroundDetector {
    /// Creates a detector with the deviation multiplier and trigger fraction.
    pub fn new(sigma: f32, threshold: f64) -> Self {
        Self { sigma, threshold }
    }

    /// Fraction of `sample` values that deviate from the background.
    ///
    /// The denominator is always the full analysis size of `sample`; values
    /// without matching statistics never count as foreground.
    pub fn score(stats: &PixelStats, sample: &Sample, sigma: f32) -> f64 {
        if sample.is_empty() || stats.is_empty() {
            return 0.0;
        }

        let foreground = sample
            .data()
            .iter()
            .zip(&stats.mean)
            .zip(&stats.stdev)
            .filter(|&((&x, &m), &s)| (x - m).abs() > s * sigma)
            .count();

        foreground as f64 / sample.len() as f64
    }

    /// Scores `sample` against `background` and applies the event threshold.
    pub fn detect(&self, background: &BackgroundModel, sample: &Sample) -> Detection {
        let fraction = Self::score(&background.stats(), sample, self.sigma);
        Detection {
            fraction,
            triggered: fraction > self.threshold,
        }
    }

    /// Deviation multiplier.
    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Foreground fraction that must be exceeded to trigger.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for ForegroundDetector {
    fn default() -> Self {
        Self::new(4.0, 0.0025)
    }
}
