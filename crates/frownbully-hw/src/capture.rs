//! Still-image capture: open the camera, grab one frame with bounded
//! retries, write it as a timestamped JPEG.

use crate::camera::{Camera, CameraError};
use crate::frame::Frame;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable after {attempts} attempts: {last_error}")]
    DeviceUnavailable {
        attempts: u32,
        last_error: String,
    },
    #[error("failed to write capture {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Parameters for a single capture.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// V4L2 device path (e.g. "/dev/video0").
    pub device: String,
    /// Directory receiving the JPEG files. Created on demand.
    pub output_dir: PathBuf,
    /// Maximum number of frame reads before giving up.
    pub max_attempts: u32,
    /// Fixed delay between failed attempts.
    pub backoff: Duration,
    /// Frames discarded right after opening the device.
    pub warmup_frames: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            output_dir: PathBuf::from("captures"),
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            warmup_frames: 0,
        }
    }
}

/// A still image written to disk.
#[derive(Debug, Clone)]
pub struct Capture {
    pub path: PathBuf,
    pub captured_at: DateTime<Local>,
}

/// Capture one frame from the configured camera and write it to disk.
///
/// The device is opened lazily on the first attempt (an open failure counts
/// as a failed attempt) and is always released before returning.
pub fn capture(settings: &CaptureSettings) -> Result<Capture, CaptureError> {
    let mut camera: Option<Camera> = None;

    let result = capture_with(settings, || {
        if camera.is_none() {
            let opened = Camera::open(&settings.device)?;
            if settings.warmup_frames > 0 {
                tracing::debug!(count = settings.warmup_frames, "discarding warmup frames");
                opened.discard_frames(settings.warmup_frames);
            }
            camera = Some(opened);
        }
        match &camera {
            Some(cam) => cam.capture_frame(),
            None => Err(CameraError::DeviceNotFound(settings.device.clone())),
        }
    });

    drop(camera);
    tracing::debug!(device = %settings.device, "camera released");
    result
}

/// Retry loop behind [`capture`], generic over the frame source.
pub fn capture_with<F>(settings: &CaptureSettings, mut grab: F) -> Result<Capture, CaptureError>
where
    F: FnMut() -> Result<Frame, CameraError>,
{
    tracing::info!(device = %settings.device, "capturing image from webcam");

    let attempts = settings.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match grab() {
            Ok(frame) => return write_frame(&settings.output_dir, &frame),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "failed to capture image");
                last_error = e.to_string();
                if attempt < attempts && !settings.backoff.is_zero() {
                    std::thread::sleep(settings.backoff);
                }
            }
        }
    }

    tracing::error!(attempts, "failed to capture image after multiple attempts");
    Err(CaptureError::DeviceUnavailable {
        attempts,
        last_error,
    })
}

fn write_frame(dir: &Path, frame: &Frame) -> Result<Capture, CaptureError> {
    std::fs::create_dir_all(dir).map_err(|source| CaptureError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let captured_at = Local::now();
    let path = dir.join(capture_file_name(&captured_at));

    let jpeg = frame.to_jpeg().map_err(|e| CaptureError::Write {
        path: path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    std::fs::write(&path, jpeg).map_err(|source| CaptureError::Write {
        path: path.clone(),
        source,
    })?;

    tracing::info!(path = %path.display(), "image captured");
    Ok(Capture { path, captured_at })
}

/// `capture_YYYYmmdd_HHMMSS_mmm.jpg`
pub fn capture_file_name(at: &DateTime<Local>) -> String {
    format!("capture_{}.jpg", at.format("%Y%m%d_%H%M%S_%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use chrono::TimeZone;

    fn settings(dir: &Path, attempts: u32) -> CaptureSettings {
        CaptureSettings {
            device: "/dev/video-test".into(),
            output_dir: dir.join("captures"),
            max_attempts: attempts,
            backoff: Duration::ZERO,
            warmup_frames: 0,
        }
    }

    fn jpeg_frame() -> Frame {
        Frame {
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 1,
            height: 1,
            format: PixelFormat::Mjpeg,
            sequence: 7,
        }
    }

    #[test]
    fn test_capture_file_name() {
        let at = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(capture_file_name(&at), "capture_20250309_140507_000.jpg");
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let result = capture_with(&settings(tmp.path(), 3), || {
            calls += 1;
            Err(CameraError::DeviceBusy)
        });

        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(CaptureError::DeviceUnavailable { attempts: 3, .. })
        ));
        assert!(!tmp.path().join("captures").exists());
    }

    #[test]
    fn test_succeeds_on_retry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let capture = capture_with(&settings(tmp.path(), 3), || {
            calls += 1;
            if calls < 2 {
                Err(CameraError::CaptureFailed("no frame".into()))
            } else {
                Ok(jpeg_frame())
            }
        })
        .unwrap();

        assert_eq!(calls, 2);
        assert!(capture.path.starts_with(tmp.path().join("captures")));
        assert_eq!(std::fs::read(&capture.path).unwrap(), jpeg_frame().data);
        let name = capture.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("capture_") && name.ends_with(".jpg"));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let result = capture_with(&settings(tmp.path(), 0), || {
            calls += 1;
            Err(CameraError::StreamingNotSupported)
        });
        assert_eq!(calls, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let result = capture(&settings(tmp.path(), 2));
        assert!(matches!(
            result,
            Err(CaptureError::DeviceUnavailable { attempts: 2, .. })
        ));
    }
}
