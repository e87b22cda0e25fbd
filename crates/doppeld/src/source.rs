//! Camera-backed image source for the engine.

use doppel_core::{CaptureError, CapturedImage, ImageFormat, ImageSource};
use doppel_hw::{Camera, CameraError};

/// Adapts the V4L2 camera to the engine's `ImageSource` seam.
pub struct V4lImageSource {
    camera: Camera,
}

impl V4lImageSource {
    /// Open the device and discard warmup frames so camera AGC/AE have
    /// settled before the first real capture.
    pub fn open(device_path: &str, warmup_frames: usize) -> Result<Self, CameraError> {
        let camera = Camera::open(device_path)?;

        if warmup_frames > 0 {
            tracing::info!(count = warmup_frames, "discarding warmup frames");
            for _ in 0..warmup_frames {
                let _ = camera.capture_photo();
            }
        }

        Ok(Self { camera })
    }
}

impl ImageSource for V4lImageSource {
    fn capture(&mut self) -> Result<CapturedImage, CaptureError> {
        let photo = self.camera.capture_photo().map_err(map_camera_error)?;
        tracing::debug!(
            bytes = photo.jpeg.len(),
            width = photo.width,
            height = photo.height,
            sequence = photo.sequence,
            "captured photo"
        );
        Ok(CapturedImage {
            data: photo.jpeg,
            format: ImageFormat::Jpeg,
            width: photo.width,
            height: photo.height,
            captured_at: photo.taken_at,
        })
    }
}

/// The session taxonomy only distinguishes whether a frame was produced,
/// not why the camera failed.
fn map_camera_error(err: CameraError) -> CaptureError {
    match err {
        CameraError::CaptureFailed(msg) => CaptureError::NoFrame(msg),
        other => CaptureError::DeviceUnavailable(other.to_string()),
    }
}
