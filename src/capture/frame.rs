//! Frame type representing a captured image with metadata.

use chrono::{DateTime, Local};

/// A single captured frame from the camera.
///
/// Frames are deliberately not `Clone`: a frame lives in exactly one place
/// at a time (the image queue, then the persistence worker) and moves
/// between them.
pub struct Frame {
    /// Raw interleaved pixel data (grayscale or RGB depending on `channels`).
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Samples per pixel (1 = grayscale, 3 = RGB).
    channels: u8,
    /// Wall-clock capture time, used for artifact names.
    timestamp: DateTime<Local>,
    /// Monotonic sequence number assigned by the source.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame stamped with the current local time.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, channels: u8, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            channels,
            timestamp: Local::now(),
            sequence,
        }
    }

    /// Creates a frame where every sample has the same value.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8, sequence: u64) -> Self {
        let len = (width as usize) * (height as usize) * (channels as usize);
        Self::new(vec![value; len], width, height, channels, sequence)
    }

    /// Replaces the capture timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consumes the frame and returns its pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the number of samples per pixel.
    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the pixel buffer size matches dimensions and layout.
    pub fn is_valid(&self) -> bool {
        self.pixel_count() > 0
            && matches!(self.channels, 1 | 3)
            && self.pixels.len() == self.pixel_count() * self.channels as usize
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
