//! Frame preprocessing: fit a frame to the detector's input geometry

use crate::error::DetectionError;
use crate::frame::Frame;
use image::imageops::{self, FilterType};
use tracing::debug;

/// Original and resized dimensions of one frame, needed to map boxes back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub original_width: u32,
    pub original_height: u32,
    pub resized_width: u32,
    pub resized_height: u32,
}

impl FrameGeometry {
    /// Per-axis factors from resized space back to original space
    pub fn scale(&self) -> (f32, f32) {
        (
            self.original_width as f32 / self.resized_width as f32,
            self.original_height as f32 / self.resized_height as f32,
        )
    }
}

/// A frame at model geometry plus the record of where it came from
#[derive(Debug, Clone)]
pub struct Resized {
    pub frame: Frame,
    pub geometry: FrameGeometry,
}

impl Resized {
    pub fn original_width(&self) -> u32 {
        self.geometry.original_width
    }

    pub fn original_height(&self) -> u32 {
        self.geometry.original_height
    }
}

/// Resize `frame` to `target_width` x `target_height`.
///
/// Aspect ratio is not preserved. Shrinking uses a triangle filter whose
/// support widens with the scale factor, which averages over the source
/// area instead of point-sampling it.
pub fn resize(frame: &Frame, target_width: u32, target_height: u32) -> Result<Resized, DetectionError> {
    if target_width == 0 || target_height == 0 {
        return Err(DetectionError::Config(format!(
            "Cannot resize to empty geometry {}x{}",
            target_width, target_height
        )));
    }

    let geometry = FrameGeometry {
        original_width: frame.width(),
        original_height: frame.height(),
        resized_width: target_width,
        resized_height: target_height,
    };

    if frame.dimensions() == (target_width, target_height) {
        return Ok(Resized { frame: frame.clone(), geometry });
    }

    debug!(
        "Resizing frame {}x{} -> {}x{}",
        frame.width(),
        frame.height(),
        target_width,
        target_height
    );

    let resized = imageops::resize(frame.as_image(), target_width, target_height, FilterType::Triangle);
    Ok(Resized {
        frame: Frame::from_derived(resized),
        geometry,
    })
}
