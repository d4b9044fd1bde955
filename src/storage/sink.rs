//! Persistence sinks for event frames.

use super::config::StorageConfig;
use crate::capture::Frame;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur while persisting a frame.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Writing to the filesystem failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// JPEG encoding failed.
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    /// The frame buffer does not match its dimensions.
    #[error("frame {sequence} cannot be encoded: buffer does not match its dimensions")]
    MalformedFrame {
        /// Capture sequence number.
        sequence: u64,
    },
    /// The background worker exited before the hand-off.
    #[error("persistence worker is no longer running")]
    WorkerGone,
    /// The background worker thread could not be started.
    #[error("failed to start persistence worker: {0}")]
    Spawn(std::io::Error),
}

/// Destination for frames belonging to an event.
pub trait PersistenceSink: Send {
    /// Persists one frame under the given event id.
    fn save_event(&mut self, frame: &Frame, event_id: u64) -> Result<(), PersistError>;
}

/// Deterministic artifact name, e.g. `00001_2015Jan01_120000.jpg`.
pub fn event_file_name(event_id: u64, timestamp: &DateTime<Local>) -> String {
    format!("{:05}_{}.jpg", event_id, timestamp.format("%Y%b%d_%H%M%S"))
}

/// Writes a full-resolution JPEG and a downscaled preview per frame.
#[derive(Debug, Clone)]
pub struct FsSink {
    events_dir: PathBuf,
    previews_dir: PathBuf,
    preview_divisor: u32,
    jpeg_quality: u8,
}

impl FsSink {
    /// Creates the sink, creating both output directories if needed.
    pub fn new(config: &StorageConfig) -> Result<Self, PersistError> {
        let events_dir = config.events_path();
        let previews_dir = config.previews_path();
        std::fs::create_dir_all(&events_dir)?;
        std::fs::create_dir_all(&previews_dir)?;

        tracing::info!(
            events = %events_dir.display(),
            previews = %previews_dir.display(),
            "Storage directories ready"
        );

        Ok(Self {
            events_dir,
            previews_dir,
            preview_divisor: config.preview_divisor.max(1),
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Directory holding full-resolution event frames.
    pub fn events_dir(&self) -> &Path {
        &self.events_dir
    }

    /// Directory holding preview images.
    pub fn previews_dir(&self) -> &Path {
        &self.previews_dir
    }

    fn to_image(frame: &Frame) -> Result<DynamicImage, PersistError> {
        let (w, h) = (frame.width(), frame.height());
        let pixels = frame.pixels().to_vec();
        let image = match frame.channels() {
            1 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
            _ => None,
        };
        image.ok_or(PersistError::MalformedFrame {
            sequence: frame.sequence(),
        })
    }

    fn write_jpeg(&self, image: &DynamicImage, path: &Path) -> Result<(), PersistError> {
        let mut writer = BufWriter::new(File::create(path)?);
        image.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality))?;
        writer.flush()?;
        Ok(())
    }
}

impl PersistenceSink for FsSink {
    fn save_event(&mut self, frame: &Frame, event_id: u64) -> Result<(), PersistError> {
        let name = event_file_name(event_id, &frame.timestamp());
        let image = Self::to_image(frame)?;

        let preview = image.resize_exact(
            (frame.width() / self.preview_divisor).max(1),
            (frame.height() / self.preview_divisor).max(1),
            FilterType::Triangle,
        );
        self.write_jpeg(&preview, &self.previews_dir.join(&name))?;
        self.write_jpeg(&image, &self.events_dir.join(&name))?;

        tracing::debug!(event = event_id, file = %name, "Event frame written");
        Ok(())
    }
}

/// A record of one persisted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFrame {
    /// Event id the frame was saved under.
    pub event_id: u64,
    /// Capture sequence number of the frame.
    pub sequence: u64,
    /// File name the frame would be written to.
    pub file_name: String,
}

/// In-memory sink that records what it was asked to save.
///
/// Clones share the same record, so a test can keep one handle while the
/// loop owns another. Event ids listed in `fail_on` are rejected.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    saved: Arc<Mutex<Vec<SavedFrame>>>,
    fail_on: Arc<Mutex<Vec<u64>>>,
}

impl RecordingSink {
    /// Creates an empty sink that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes saving `event_id` fail with an I/O error.
    pub fn fail_on(&self, event_id: u64) {
        if let Ok(mut ids) = self.fail_on.lock() {
            ids.push(event_id);
        }
    }

    /// Snapshot of everything saved so far.
    pub fn saved(&self) -> Vec<SavedFrame> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl PersistenceSink for RecordingSink {
    fn save_event(&mut self, frame: &Frame, event_id: u64) -> Result<(), PersistError> {
        let rejected = self
            .fail_on
            .lock()
            .map(|ids| ids.contains(&event_id))
            .unwrap_or(false);
        if rejected {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }

        let record = SavedFrame {
            event_id,
            sequence: frame.sequence(),
            file_name: event_file_name(event_id, &frame.timestamp()),
        };
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2015, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_event_file_name() {
        assert_eq!(event_file_name(1, &fixed_time()), "00001_2015Jan01_120000.jpg");
        assert_eq!(event_file_name(123456, &fixed_time()), "123456_2015Jan01_120000.jpg");
    }

    #[test]
    fn test_fs_sink_writes_event_and_preview() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut sink = FsSink::new(&config).unwrap();

        let frame = Frame::filled(30, 24, 3, 128, 1).with_timestamp(fixed_time());
        sink.save_event(&frame, 7).unwrap();

        let name = "00007_2015Jan01_120000.jpg";
        let event = image::open(dir.path().join("events").join(name)).unwrap();
        let preview = image::open(dir.path().join("previews").join(name)).unwrap();
        assert_eq!((event.width(), event.height()), (30, 24));
        assert_eq!((preview.width(), preview.height()), (10, 8));
    }

    #[test]
    fn test_fs_sink_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut sink = FsSink::new(&config).unwrap();

        let frame = Frame::filled(9, 9, 1, 10, 1).with_timestamp(fixed_time());
        sink.save_event(&frame, 0).unwrap();

        assert!(dir.path().join("events/00000_2015Jan01_120000.jpg").exists());
    }

    #[test]
    fn test_fs_sink_rejects_truncated_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut sink = FsSink::new(&config).unwrap();

        let frame = Frame::new(vec![0u8; 5], 10, 10, 3, 4);
        assert!(matches!(
            sink.save_event(&frame, 0),
            Err(PersistError::MalformedFrame { sequence: 4 })
        ));
    }

    #[test]
    fn test_recording_sink_failure_injection() {
        let sink = RecordingSink::new();
        sink.fail_on(1);
        let mut handle = sink.clone();

        assert!(handle.save_event(&Frame::filled(2, 2, 1, 0, 1), 0).is_ok());
        assert!(handle.save_event(&Frame::filled(2, 2, 1, 0, 2), 1).is_err());

        let saved = sink.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].event_id, 0);
    }
}
