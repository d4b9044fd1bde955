//! Camera input and frame handling.
//!
//! This module provides abstractions for capturing frames from a camera
//! and managing camera configuration. Everything downstream only sees the
//! `FrameSource` trait.

mod camera;
mod config;
#[cfg(feature = "camera")]
mod device;
mod frame;

pub use camera::{CameraError, FrameSource, ScriptStep, ScriptedCamera, SyntheticCamera};
pub use config::CaptureConfig;
#[cfg(feature = "camera")]
pub use device::DeviceCamera;
pub use frame::Frame;
