//! Hardware camera source backed by `nokhwa`.

use super::{CameraError, CaptureConfig, Frame, FrameSource};
use nokhwa::pixel_format::{LumaFormat, RgbFormat};
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

/// A native (V4L2 / AVFoundation / MSMF) camera.
///
/// The stream is opened on `open()` and stopped on `close()`, so the
/// darkness governor can power the sensor down between checks.
#[derive(Default)]
pub struct DeviceCamera {
    camera: Option<Camera>,
    channels: u8,
    sequence: u64,
}

impl DeviceCamera {
    /// Creates a closed handle for the first camera.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSource for DeviceCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let format = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested = if config.channels == 1 {
            RequestedFormat::new::<LumaFormat>(RequestedFormatType::Closest(format))
        } else {
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format))
        };

        let mut camera = Camera::new(CameraIndex::Index(config.device_id), requested)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        tracing::info!(device = config.device_id, "Camera stream opened");
        self.camera = Some(camera);
        self.channels = config.channels;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let camera = self.camera.as_mut().ok_or(CameraError::NotInitialized)?;
        let buffer = camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let (width, height, pixels) = if self.channels == 1 {
            let image = buffer
                .decode_image::<LumaFormat>()
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
            (image.width(), image.height(), image.into_raw())
        } else {
            let image = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
            (image.width(), image.height(), image.into_raw())
        };

        self.sequence += 1;
        Ok(Frame::new(pixels, width, height, self.channels, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.camera.is_some()
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!(error = %e, "Failed to stop camera stream");
            }
            tracing::info!("Camera stream closed");
        }
    }
}
