//! Raw camera frames and their conversion to JPEG.

use std::io::Cursor;

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion-JPEG: every frame is a complete JPEG image.
    Mjpeg,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
}

/// A single captured camera frame, still in the driver's pixel format.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sequence: u32,
}

impl Frame {
    /// Encode the frame as JPEG bytes.
    ///
    /// MJPG frames are passed through untouched; YUYV frames are converted
    /// to RGB and encoded.
    pub fn to_jpeg(&self) -> Result<Vec<u8>, FrameError> {
        match self.format {
            PixelFormat::Mjpeg => Ok(self.data.clone()),
            PixelFormat::Yuyv => {
                let rgb = yuyv_to_rgb(&self.data, self.width, self.height)?;
                let img = image::RgbImage::from_raw(self.width, self.height, rgb).ok_or(
                    FrameError::InvalidLength {
                        expected: (self.width * self.height * 3) as usize,
                        actual: 0,
                    },
                )?;
                let mut out = Vec::new();
                image::DynamicImage::ImageRgb8(img)
                    .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)?;
                Ok(out)
            }
        }
    }
}

/// Convert packed YUYV (4:2:2) to interleaved RGB8 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(clamp_u8(y + 1.402 * v));
            rgb.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(rgb)
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
