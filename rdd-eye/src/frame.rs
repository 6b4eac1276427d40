//! Immutable frame buffers and their codecs

use crate::error::DetectionError;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, RgbImage};
use std::sync::Arc;

/// File name offered for a downloaded prediction
pub const EXPORT_FILE_NAME: &str = "RDD_Prediction.png";
/// MIME type of the export
pub const EXPORT_MIME: &str = "image/png";

/// One still image, RGB8 channel order.
///
/// The pixel buffer is shared and never mutated; stages that need a
/// modified image allocate a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: Arc<RgbImage>,
}

impl Frame {
    /// Wrap an RGB image, rejecting empty geometry
    pub fn new(image: RgbImage) -> Result<Self, DetectionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectionError::InvalidFrame(format!(
                "Frame has empty geometry {}x{}",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { image: Arc::new(image) })
    }

    /// Wrap an image derived from an existing frame, whose geometry is
    /// already known to be non-empty
    pub(crate) fn from_derived(image: RgbImage) -> Self {
        debug_assert!(image.width() > 0 && image.height() > 0);
        Self { image: Arc::new(image) }
    }

    /// Build a frame from tightly packed RGB8 bytes
    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>) -> Result<Self, DetectionError> {
        let expected = packed_len(width, height)?;
        if data.len() != expected {
            return Err(DetectionError::InvalidFrame(format!(
                "Expected {} bytes for {}x{} RGB8, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| DetectionError::InvalidFrame("Buffer does not match geometry".to_string()))?;
        Self::new(image)
    }

    /// Build a frame from BGR24 bytes, the order webcam transports deliver
    pub fn from_bgr24(width: u32, height: u32, data: &[u8]) -> Result<Self, DetectionError> {
        let expected = packed_len(width, height)?;
        if data.len() != expected {
            return Err(DetectionError::InvalidFrame(format!(
                "Expected {} bytes for {}x{} BGR24, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        let mut rgb = Vec::with_capacity(data.len());
        for px in data.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        Self::from_rgb8(width, height, rgb)
    }

    /// Decode an uploaded PNG or JPEG image
    pub fn decode(bytes: &[u8]) -> Result<Self, DetectionError> {
        let format = image::guess_format(bytes)
            .map_err(|e| DetectionError::InvalidFrame(format!("Unrecognised image data: {}", e)))?;

        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(DetectionError::InvalidFrame(format!(
                "Unsupported upload format {:?} (expected PNG or JPEG)",
                format
            )));
        }

        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| DetectionError::InvalidFrame(format!("Failed to decode image: {}", e)))?;

        Self::new(decoded.to_rgb8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Borrow the underlying pixels
    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    /// Owned copy of the pixels, for stages that draw or resample
    pub fn to_image(&self) -> RgbImage {
        self.image.as_ref().clone()
    }

    /// Pixels converted back to BGR24 for the transport
    pub fn to_bgr24(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.image.as_raw().len());
        for px in self.image.as_raw().chunks_exact(3) {
            out.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        out
    }

    /// Whether two handles share the same buffer
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

fn packed_len(width: u32, height: u32) -> Result<usize, DetectionError> {
    if width == 0 || height == 0 {
        return Err(DetectionError::InvalidFrame(format!(
            "Frame has empty geometry {}x{}",
            width, height
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|p| p.checked_mul(3))
        .ok_or_else(|| DetectionError::InvalidFrame("Frame size overflows".to_string()))
}

/// Encode a frame as PNG bytes for download
pub fn export_png(frame: &Frame) -> Result<Vec<u8>, DetectionError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer).write_image(
        frame.as_image().as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(buffer)
}
