use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;

use super::CaptureError;
use crate::config::CropRect;

/// One decoded frame.
///
/// Cloning is cheap: the pixels are shared and never mutated after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic sequence number, starting at 0
    pub index: u64,
    pub captured_at: Instant,
    pub image: Arc<RgbImage>,
}

/// Cuts the console's active picture out of a captured frame.
pub fn crop_to(image: &RgbImage, crop: &CropRect) -> Result<RgbImage, CaptureError> {
    if image.width() < crop.right || image.height() < crop.bottom || crop.width() == 0 || crop.height() == 0 {
        return Err(CaptureError::Geometry {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image::imageops::crop_imm(image, crop.left, crop.top, crop.width(), crop.height()).to_image())
}
