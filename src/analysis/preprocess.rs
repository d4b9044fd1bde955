//! Frame downsampling into analysis samples.
//!
//! Full-resolution frames are far too large to keep sixty of in memory, so
//! every frame is reduced to a small fixed resolution before any statistics
//! are computed. Channels are kept as-is: summing RGB into a single 8-bit
//! luma value would throw away variance the detector relies on.

use crate::capture::Frame;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a frame cannot be reduced to a sample.
#[derive(Debug, Clone, Error)]
pub enum PreprocessError {
    /// The pixel buffer does not match the frame dimensions.
    #[error("frame {sequence} has {len} bytes, expected {expected} for {width}x{height}x{channels}")]
    Malformed {
        /// Capture sequence number.
        sequence: u64,
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Declared channel count.
        channels: u8,
        /// Actual buffer length.
        len: usize,
        /// Buffer length implied by the dimensions.
        expected: usize,
    },
    /// Only grayscale and RGB frames are analysed.
    #[error("frame {sequence} has unsupported channel count {channels}")]
    UnsupportedChannels {
        /// Capture sequence number.
        sequence: u64,
        /// Declared channel count.
        channels: u8,
    },
}

/// A downsampled, immutable view of one frame.
///
/// The data is reference counted, so cloning a sample to hand it to the
/// background model is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    width: u32,
    height: u32,
    channels: u8,
    data: Arc<[f32]>,
}

impl Sample {
    /// Builds a sample from raw values. `data.len()` must equal
    /// `width * height * channels`.
    pub fn from_values(width: u32, height: u32, channels: u8, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * channels as usize);
        Self {
            width,
            height,
            channels,
            data: data.into(),
        }
    }

    /// Builds a sample where every value is `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: f32) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self::from_values(width, height, channels, vec![value; len])
    }

    /// Pixel values, row-major.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of analysis values (pixels times channels).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the sample has no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Analysis width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Analysis height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Channels per pixel.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Sum of all values.
    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    /// Mean value, or 0 for an empty sample.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f64
    }
}

/// Reduces frames to fixed-size analysis samples.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    width: u32,
    height: u32,
}

impl Preprocessor {
    /// Creates a preprocessor targeting the given analysis resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Target analysis resolution as `(width, height)`.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Downsamples `frame` with a triangle filter.
    ///
    /// Truncated or oddly shaped buffers are rejected rather than padded.
    pub fn process(&self, frame: &Frame) -> Result<Sample, PreprocessError> {
        let channels = frame.channels();
        if !matches!(channels, 1 | 3) {
            return Err(PreprocessError::UnsupportedChannels {
                sequence: frame.sequence(),
                channels,
            });
        }

        let expected = frame.pixel_count() * channels as usize;
        if frame.pixel_count() == 0 || frame.pixels().len() != expected {
            return Err(self.malformed(frame, expected));
        }

        let data = match channels {
            1 => self.downsample::<Luma<u8>>(frame),
            _ => self.downsample::<Rgb<u8>>(frame),
        }
        .ok_or_else(|| self.malformed(frame, expected))?;

        Ok(Sample::from_values(self.width, self.height, channels, data))
    }

    fn downsample<P>(&self, frame: &Frame) -> Option<Vec<f32>>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        let view = ImageBuffer::<P, &[u8]>::from_raw(frame.width(), frame.height(), frame.pixels())?;
        let small = imageops::resize(&view, self.width, self.height, FilterType::Triangle);
        Some(small.into_raw().into_iter().map(f32::from).collect())
    }

    fn malformed(&self, frame: &Frame, expected: usize) -> PreprocessError {
        PreprocessError::Malformed {
            sequence: frame.sequence(),
            width: frame.width(),
            height: frame.height(),
            channels: frame.channels(),
            len: frame.pixels().len(),
            expected,
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(160, 120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_frame_stays_constant() {
        let pre = Preprocessor::new(8, 6);
        let frame = Frame::filled(32, 24, 3, 100, 1);

        let sample = pre.process(&frame).unwrap();

        assert_eq!(sample.len(), 8 * 6 * 3);
        assert_eq!(sample.channels(), 3);
        assert!(sample.data().iter().all(|&v| v == 100.0));
    }

    #[test]
    fn test_grayscale_frame() {
        let pre = Preprocessor::new(4, 3);
        let frame = Frame::filled(16, 12, 1, 42, 1);

        let sample = pre.process(&frame).unwrap();

        assert_eq!(sample.len(), 12);
        assert!((sample.mean() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let pre = Preprocessor::new(4, 3);
        let frame = Frame::new(vec![0u8; 10], 16, 12, 3, 9);

        assert!(matches!(
            pre.process(&frame),
            Err(PreprocessError::Malformed { sequence: 9, len: 10, .. })
        ));
    }

    #[test]
    fn test_unsupported_channels_rejected() {
        let pre = Preprocessor::new(4, 3);
        let frame = Frame::filled(16, 12, 4, 0, 2);

        assert!(matches!(
            pre.process(&frame),
            Err(PreprocessError::UnsupportedChannels { channels: 4, .. })
        ));
    }

    #[test]
    fn test_sample_sum_and_mean() {
        let sample = Sample::from_values(2, 1, 1, vec![10.0, 30.0]);
        assert_eq!(sample.sum(), 40.0);
        assert_eq!(sample.mean(), 20.0);
    }
}
