//! Normalized cross-correlation of reference patches against frame regions.
//!
//! Equivalent to a correlation-coefficient template match: both the patch
//! and the frame window are mean-centered, so a uniform brightness shift
//! (capture gain, compression) does not change the score.

use image::{GrayImage, RgbImage};

use super::preprocess::luma;

/// A mean-centered reference patch.
#[derive(Debug, Clone)]
pub struct Template {
    width: u32,
    height: u32,
    centered: Vec<f32>,
    norm: f32,
}

impl Template {
    /// Builds a template from a luma image. Returns `None` for a patch with
    /// no contrast, which would match anything equally.
    pub fn from_luma(img: &GrayImage) -> Option<Self> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let values: Vec<f32> = img.pixels().map(|p| f32::from(p[0])).collect();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let centered: Vec<f32> = values.iter().map(|v| v - mean).collect();
        let norm = centered.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm < 1e-3 {
            return None;
        }
        Some(Self {
            width,
            height,
            centered,
            norm,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Correlation of the template with the window whose top-left is `(ox, oy)`.
    ///
    /// Returns 0.0 for a flat window. The window must lie inside `frame`.
    fn score_at(&self, frame: &RgbImage, ox: u32, oy: u32) -> f32 {
        let mut window = Vec::with_capacity(self.centered.len());
        for y in oy..oy + self.height {
            for x in ox..ox + self.width {
                window.push(luma(frame.get_pixel(x, y)));
            }
        }
        let mean = window.iter().sum::<f32>() / window.len() as f32;

        let mut dot = 0.0f32;
        let mut energy = 0.0f32;
        for (w, t) in window.iter().zip(&self.centered) {
            let c = w - mean;
            dot += c * t;
            energy += c * c;
        }
        if energy < 1e-3 {
            return 0.0;
        }
        dot / (energy.sqrt() * self.norm)
    }

    /// Best correlation with the template anchored at `(x, y)`, searching
    /// `margin` pixels in every direction. Positions are clamped to the frame.
    pub fn best_match(&self, frame: &RgbImage, x: u32, y: u32, margin: u32) -> f32 {
        let (fw, fh) = frame.dimensions();
        if self.width > fw || self.height > fh {
            return 0.0;
        }
        let max_x = fw - self.width;
        let max_y = fh - self.height;
        let x0 = x.saturating_sub(margin).min(max_x);
        let x1 = (x + margin).min(max_x);
        let y0 = y.saturating_sub(margin).min(max_y);
        let y1 = (y + margin).min(max_y);

        let mut best = f32::MIN;
        for oy in y0..=y1 {
            for ox in x0..=x1 {
                best = best.max(self.score_at(frame, ox, oy));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn stripes(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([if (x / 2) % 2 == 0 { 30 } else { 220 }]))
    }

    fn frame_with_stripes_at(ox: u32, oy: u32, offset: u8) -> RgbImage {
        let patch = stripes(12, 6);
        RgbImage::from_fn(40, 20, |x, y| {
            if x >= ox && x < ox + 12 && y >= oy && y < oy + 6 {
                let v = patch.get_pixel(x - ox, y - oy)[0].saturating_add(offset);
                Rgb([v, v, v])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn test_flat_template_rejected() {
        assert!(Template::from_luma(&GrayImage::new(4, 4)).is_none());
    }

    #[test]
    fn test_exact_match_scores_one() {
        let template = Template::from_luma(&stripes(12, 6)).unwrap();
        let frame = frame_with_stripes_at(10, 5, 0);
        assert!(template.best_match(&frame, 10, 5, 0) > 0.999);
    }

    #[test]
    fn test_brightness_shift_still_matches() {
        let template = Template::from_luma(&stripes(12, 6)).unwrap();
        let frame = frame_with_stripes_at(10, 5, 25);
        assert!(template.best_match(&frame, 10, 5, 0) > 0.99);
    }

    #[test]
    fn test_margin_finds_shifted_patch() {
        let template = Template::from_luma(&stripes(12, 6)).unwrap();
        let frame = frame_with_stripes_at(12, 6, 0);
        assert!(template.best_match(&frame, 10, 5, 0) < 0.95);
        assert!(template.best_match(&frame, 10, 5, 2) > 0.999);
    }

    #[test]
    fn test_search_clamped_to_frame() {
        let template = Template::from_luma(&stripes(12, 6)).unwrap();
        let frame = frame_with_stripes_at(28, 14, 0);
        assert!(template.best_match(&frame, 28, 14, 5) > 0.999);
    }

    #[test]
    fn test_flat_window_scores_zero() {
        let template = Template::from_luma(&stripes(12, 6)).unwrap();
        let frame = RgbImage::from_pixel(40, 20, Rgb([90, 90, 90]));
        assert_eq!(template.best_match(&frame, 0, 0, 3), 0.0);
    }
}
