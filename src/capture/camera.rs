//! Frame source abstraction.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and synthetic implementations for
//! demos and testing.

use super::{CaptureConfig, Frame};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device matched the request.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The device exists but could not be opened.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The device rejected the requested format.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// Grabbing or decoding a frame failed.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// Capture was attempted before `open`.
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for frame source implementations.
///
/// The motion loop calls `capture()` once per cycle and only closes and
/// re-opens the source around darkness sleeps.
pub trait FrameSource {
    /// Opens and initializes the source with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Captures a single frame, blocking until one is available.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the source is currently open.
    fn is_open(&self) -> bool;

    /// Closes the source and releases (or powers down) the hardware.
    fn close(&mut self);
}

/// Deterministic synthetic camera.
///
/// Produces frames of a constant base value with a small fixed jitter, and
/// can paint a bright block into chosen frames to simulate an intrusion.
#[derive(Debug)]
pub struct SyntheticCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
    base: u8,
    jitter: u8,
    intrusions: BTreeMap<u64, u8>,
}

impl SyntheticCamera {
    /// Creates a closed camera producing a flat scene at `base`.
    pub fn new(base: u8) -> Self {
        Self {
            config: None,
            sequence: 0,
            base,
            jitter: 0,
            intrusions: BTreeMap::new(),
        }
    }

    /// Adds a per-pixel jitter of up to `amplitude` levels.
    pub fn with_jitter(mut self, amplitude: u8) -> Self {
        self.jitter = amplitude;
        self
    }

    /// Paints a block of `value` into the center of frame `sequence`.
    pub fn with_intrusion(mut self, sequence: u64, value: u8) -> Self {
        self.intrusions.insert(sequence, value);
        self
    }

    fn sample_at(&self, x: u32, y: u32, config: &CaptureConfig) -> u8 {
        if let Some(&value) = self.intrusions.get(&self.sequence) {
            let (w, h) = (config.width, config.height);
            if x >= w / 4 && x < w - w / 4 && y >= h / 4 && y < h - h / 4 {
                return value;
            }
        }
        if self.jitter == 0 {
            return self.base;
        }
        let mix = (x as u64 * 31 + y as u64 * 17 + self.sequence * 7) % (self.jitter as u64 + 1);
        self.base.saturating_add(mix as u8)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FrameSource for SyntheticCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        tracing::info!(
            width = config.width,
            height = config.height,
            "SyntheticCamera opened"
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.clone().ok_or(CameraError::NotInitialized)?;

        self.sequence += 1;
        let channels = config.channels as usize;
        let mut pixels = Vec::with_capacity(config.width as usize * config.height as usize * channels);
        for y in 0..config.height {
            for x in 0..config.width {
                let value = self.sample_at(x, y, &config);
                pixels.extend(std::iter::repeat(value).take(channels));
            }
        }

        Ok(Frame::new(
            pixels,
            config.width,
            config.height,
            config.channels,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("SyntheticCamera closed");
    }
}

/// One scripted capture result.
#[derive(Debug)]
pub enum ScriptStep {
    /// Deliver this frame.
    Frame(Frame),
    /// Fail the capture with this message.
    Fail(String),
}

/// Camera that replays a prepared script of frames and failures.
///
/// Records how often it was opened, closed and asked for a frame, so tests
/// can assert on power management and retry behavior.
#[derive(Debug, Default)]
pub struct ScriptedCamera {
    script: VecDeque<ScriptStep>,
    open: bool,
    open_calls: u32,
    close_calls: u32,
    capture_calls: u32,
}

impl ScriptedCamera {
    /// Creates a camera with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a script of constant-valued frames.
    pub fn from_values(width: u32, height: u32, channels: u8, values: &[u8]) -> Self {
        let mut camera = Self::new();
        for &value in values {
            camera.push_value(width, height, channels, value);
        }
        camera
    }

    /// Appends a constant-valued frame to the script.
    pub fn push_value(&mut self, width: u32, height: u32, channels: u8, value: u8) {
        let sequence = self.script.len() as u64 + 1;
        self.script
            .push_back(ScriptStep::Frame(Frame::filled(width, height, channels, value, sequence)));
    }

    /// Appends an arbitrary step to the script.
    pub fn push(&mut self, step: ScriptStep) {
        self.script.push_back(step);
    }

    /// Number of steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// Times `open` was called.
    pub fn open_calls(&self) -> u32 {
        self.open_calls
    }

    /// Times `close` was called.
    pub fn close_calls(&self) -> u32 {
        self.close_calls
    }

    /// Times `capture` was called, including failures.
    pub fn capture_calls(&self) -> u32 {
        self.capture_calls
    }
}

impl FrameSource for ScriptedCamera {
    fn open(&mut self, _config: &CaptureConfig) -> Result<(), CameraError> {
        self.open = true;
        self.open_calls += 1;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        if !self.open {
            return Err(CameraError::NotInitialized);
        }
        self.capture_calls += 1;
        match self.script.pop_front() {
            Some(ScriptStep::Frame(frame)) => Ok(frame),
            Some(ScriptStep::Fail(msg)) => Err(CameraError::CaptureFailed(msg)),
            None => Err(CameraError::CaptureFailed("script exhausted".into())),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
        self.close_calls += 1;
    }
}
