//! Distance readout: per-cell nearest-glyph matching.

use image::RgbImage;

use super::preprocess::{bright_mask, mask_distance};
use super::references::{DigitGrid, Glyph};
use super::RecognitionError;

/// Cells with less lit area than this are treated as empty.
const BLANK_FRACTION: f32 = 0.02;

/// Reads the glyph sequence shown in the grid.
///
/// The readout is right-aligned, so empty cells are only allowed before the
/// first lit one. Every cell after that must match some glyph within
/// `tolerance` (fraction of differing pixels), otherwise the read fails with
/// `UnrecognizedGlyph`.
pub fn read_cells(
    frame: &RgbImage,
    grid: &DigitGrid,
    glyphs: &[Glyph],
    text_threshold: u8,
    tolerance: f32,
) -> Result<String, RecognitionError> {
    let mut text = String::with_capacity(grid.cells as usize);
    for cell in 0..grid.cells {
        let mask = bright_mask(frame, grid.cell(cell), text_threshold);
        let lit = mask.iter().filter(|&&on| on).count();
        if (lit as f32) < BLANK_FRACTION * mask.len() as f32 {
            if text.is_empty() {
                continue;
            }
            // A gap inside the readout would silently shift the digits.
            return Err(RecognitionError::UnrecognizedGlyph {
                cell: cell as usize,
                distance: 1.0,
            });
        }

        let best = glyphs
            .iter()
            .map(|g| (g.symbol, mask_distance(&mask, &g.mask)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match best {
            Some((symbol, distance)) if distance <= tolerance => text.push(symbol),
            Some((_, distance)) => {
                return Err(RecognitionError::UnrecognizedGlyph {
                    cell: cell as usize,
                    distance,
                })
            }
            None => {
                return Err(RecognitionError::UnrecognizedGlyph {
                    cell: cell as usize,
                    distance: 1.0,
                })
            }
        }
    }
    Ok(text)
}

/// Parses a readout such as `87.45m` into meters.
///
/// The console always shows one or more digits, a decimal point and exactly
/// two decimals, optionally followed by the `m` unit. Anything else is
/// `UnreadableDistance`.
pub fn parse_distance(text: &str) -> Result<f64, RecognitionError> {
    let unreadable = || RecognitionError::UnreadableDistance(text.to_string());
    let number = text.strip_suffix('m').unwrap_or(text);
    let (whole, decimals) = number.split_once('.').ok_or_else(unreadable)?;
    let digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || !digits(decimals) || decimals.len() != 2 {
        return Err(unreadable());
    }
    number.parse::<f64>().map_err(|_| unreadable())
}
