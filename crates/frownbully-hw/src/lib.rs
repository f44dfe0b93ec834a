//! frownbully-hw — Hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access and still-image capture to
//! timestamped JPEG files.

pub mod camera;
pub mod capture;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use capture::{capture, Capture, CaptureError, CaptureSettings};
pub use frame::{Frame, PixelFormat};
