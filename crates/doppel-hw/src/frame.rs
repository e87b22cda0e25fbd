//! Photo type and image conversion helpers for webcam capture.

use image::ImageEncoder;
use thiserror::Error;

/// A captured, JPEG-encoded photo.
#[derive(Clone)]
pub struct Photo {
    /// Encoded JPEG bytes.
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub taken_at: std::time::Instant,
    pub sequence: u32,
}

impl Photo {
    /// Mean luma of the decoded photo (0.0-255.0), for diagnostics.
    /// `None` when the JPEG stream cannot be decoded.
    pub fn estimate_brightness(&self) -> Option<f32> {
        let decoded = image::load_from_memory(&self.jpeg).ok()?;
        let gray = decoded.to_luma8();
        let pixels = gray.as_raw();
        if pixels.is_empty() {
            return None;
        }
        Some(pixels.iter().map(|&p| p as f32).sum::<f32>() / pixels.len() as f32)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

/// Convert packed YUYV (4:2:2) to interleaved RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], with the U/V pair
/// shared by both pixels. Conversion uses the BT.601 studio-swing
/// coefficients, which is what UVC webcams emit.
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
        push_rgb(&mut rgb, chunk[0], chunk[1], chunk[3]);
        push_rgb(&mut rgb, chunk[2], chunk[1], chunk[3]);
    }
    Ok(rgb)
}

/// BT.601 YUV -> RGB for one pixel.
fn push_rgb(rgb: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;

    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;

    rgb.push(clamp_u8(r));
    rgb.push(clamp_u8(g));
    rgb.push(clamp_u8(b));
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Encode interleaved RGB pixels as a JPEG stream.
pub fn encode_jpeg(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .write_image(rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(out)
}

/// JPEG streams start with the SOI marker (FF D8).
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}
