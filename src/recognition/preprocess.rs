use image::{GrayImage, Luma, RgbImage};

/// ITU-R BT.601 luma of one RGB pixel, 0.0 (black) to 255.0 (white).
#[inline]
pub fn luma(pixel: &image::Rgb<u8>) -> f32 {
    0.299 * f32::from(pixel[0]) + 0.587 * f32::from(pixel[1]) + 0.114 * f32::from(pixel[2])
}

/// Converts an RGB image to BT.601 luma.
pub fn to_luma(img: &RgbImage) -> GrayImage {
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([luma(img.get_pixel(x, y)).round() as u8])
    })
}

/// Pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.x + self.width <= width && self.y + self.height <= height
    }
}

/// Marks the bright (text) pixels of a region, row-major.
///
/// A pixel is text when R, G and B all exceed `threshold`. The result has
/// `region.width * region.height` entries. Callers must check
/// [`Region::fits`] first.
///
/// Recommended thresholds:
/// - Lossless captures: 190
/// - MJPG video frames: 160
pub fn bright_mask(img: &RgbImage, region: Region, threshold: u8) -> Vec<bool> {
    let mut mask = Vec::with_capacity((region.width * region.height) as usize);
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            let pixel = img.get_pixel(x, y);
            mask.push(pixel[0] > threshold && pixel[1] > threshold && pixel[2] > threshold);
        }
    }
    mask
}

/// Fraction of positions where two equally sized masks disagree.
pub fn mask_distance(a: &[bool], b: &[bool]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 1.0;
    }
    let differing = a.iter().zip(b).filter(|(p, q)| p != q).count();
    differing as f32 / a.len() as f32
}
