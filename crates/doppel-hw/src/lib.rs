//! Hardware abstraction for webcam photo capture.
//!
//! Provides V4L2-based camera access producing JPEG-encoded photos,
//! either passed through from MJPG streams or converted from YUYV.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Photo;
