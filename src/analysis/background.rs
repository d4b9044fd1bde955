//! Sliding-window background model.
//!
//! Keeps the last `N` samples and derives a per-pixel mean and standard
//! deviation across them. A plain box window (no exponential decay) adapts
//! slowly to lighting drift but is fully deterministic.

use super::preprocess::Sample;
use std::collections::VecDeque;

/// Per-pixel statistics across the background window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelStats {
    /// Per-pixel mean.
    pub mean: Vec<f32>,
    /// Per-pixel population standard deviation.
    pub stdev: Vec<f32>,
    /// Number of samples the statistics were computed from.
    pub samples: usize,
}

impl PixelStats {
    /// True when no samples contributed (degenerate statistics).
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Number of pixel values covered.
    pub fn len(&self) -> usize {
        self.mean.len()
    }
}

/// Bounded FIFO of recent "normal" samples.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    window: VecDeque<Sample>,
    capacity: usize,
}

impl BackgroundModel {
    /// Creates an empty model holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest one first when full.
    pub fn push(&mut self, sample: Sample) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        tracing::trace!(len = self.window.len(), "Background sample pushed");
    }

    /// Computes per-pixel mean and standard deviation.
    ///
    /// An empty window yields empty statistics rather than an error.
    pub fn stats(&self) -> PixelStats {
        let Some(first) = self.window.front() else {
            return PixelStats::default();
        };

        let n = self.window.len() as f64;
        let len = first.len();

        let mut sums = vec![0f64; len];
        for sample in &self.window {
            for (acc, &v) in sums.iter_mut().zip(sample.data()) {
                *acc += v as f64;
            }
        }
        let mean: Vec<f64> = sums.into_iter().map(|s| s / n).collect();

        let mut squares = vec![0f64; len];
        for sample in &self.window {
            for ((acc, &v), &m) in squares.iter_mut().zip(sample.data()).zip(&mean) {
                *acc += (v as f64 - m).powi(2);
            }
        }

        PixelStats {
            mean: mean.iter().map(|&m| m as f32).collect(),
            stdev: squares.into_iter().map(|s| (s / n).sqrt() as f32).collect(),
            samples: self.window.len(),
        }
    }

    /// Samples currently in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether no sample has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Whether the window holds `N` samples.
    pub fn is_full(&self) -> bool {
        self.window.len() == self.capacity
    }

    /// The window size `N`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.window.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tagged(value: f32) -> Sample {
        Sample::filled(2, 2, 1, value)
    }

    #[test]
    fn test_empty_stats_degenerate() {
        let model = BackgroundModel::new(5);
        let stats = model.stats();
        assert!(stats.is_empty());
        assert_eq!(stats.len(), 0);
    }

    #[test]
    fn test_constant_window_zero_stdev() {
        let mut model = BackgroundModel::new(4);
        for _ in 0..4 {
            model.push(tagged(100.0));
        }

        let stats = model.stats();
        assert_eq!(stats.samples, 4);
        assert!(stats.mean.iter().all(|&m| m == 100.0));
        assert!(stats.stdev.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_population_stdev() {
        let mut model = BackgroundModel::new(2);
        model.push(tagged(10.0));
        model.push(tagged(30.0));

        let stats = model.stats();
        assert!(stats.mean.iter().all(|&m| m == 20.0));
        assert!(stats.stdev.iter().all(|&s| (s - 10.0).abs() < 1e-6));
    }

    #[test]
    fn test_overflow_keeps_last_n() {
        let mut model = BackgroundModel::new(3);
        for v in 0..4 {
            model.push(tagged(v as f32));
        }

        let kept: Vec<f32> = model.iter().map(|s| s.data()[0]).collect();
        assert_eq!(kept, vec![1.0, 2.0, 3.0]);
        assert!(model.is_full());
    }

    proptest! {
        #[test]
        fn prop_window_bounded_and_fifo(capacity in 1usize..16, pushes in 0usize..64) {
            let mut model = BackgroundModel::new(capacity);
            for v in 0..pushes {
                model.push(tagged(v as f32));
                prop_assert!(model.len() <= capacity);
            }

            let expected: Vec<f32> = (pushes.saturating_sub(capacity)..pushes)
                .map(|v| v as f32)
                .collect();
            let kept: Vec<f32> = model.iter().map(|s| s.data()[0]).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
