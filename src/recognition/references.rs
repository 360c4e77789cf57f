//! Versioned reference data: screen signatures and digit glyphs.
//!
//! Layout of a templates directory:
//!
//! ```text
//! templates/
//!   manifest.json
//!   try-again.png  fault.png  result.png  ready.png  in-progress.png
//!   glyph-0.png ... glyph-9.png  glyph-dot.png  glyph-m.png
//! ```
//!
//! Signature images are patches cut from real captures at the position the
//! manifest gives. Glyph images are one digit cell each.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;

use super::preprocess::{bright_mask, to_luma, Region};
use super::signature::Template;
use super::ScreenKind;

/// Manifest format this build understands.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid reference set: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct Manifest {
    version: u32,
    frame_width: u32,
    frame_height: u32,
    signatures: Vec<SignatureEntry>,
    digits: DigitGrid,
    glyphs: Vec<GlyphEntry>,
}

#[derive(Debug, Deserialize)]
struct SignatureEntry {
    name: String,
    state: ScreenKind,
    x: u32,
    y: u32,
    template: String,
}

#[derive(Debug, Deserialize)]
struct GlyphEntry {
    symbol: char,
    template: String,
}

/// Fixed-width character cells of the distance readout, left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DigitGrid {
    pub x: u32,
    pub y: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub cells: u32,
}

impl DigitGrid {
    pub fn cell(&self, index: u32) -> Region {
        Region {
            x: self.x + index * self.cell_width,
            y: self.y,
            width: self.cell_width,
            height: self.cell_height,
        }
    }
}

/// One screen signature: a patch expected at a fixed position.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub kind: ScreenKind,
    pub x: u32,
    pub y: u32,
    pub template: Template,
}

/// One reference glyph as a binary mask the size of a digit cell.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub symbol: char,
    pub mask: Vec<bool>,
}

/// Signatures in match order plus the digit grid and its glyph alphabet.
#[derive(Debug, Clone)]
pub struct ReferenceSet {
    pub frame_width: u32,
    pub frame_height: u32,
    pub signatures: Vec<Signature>,
    pub grid: DigitGrid,
    pub glyphs: Vec<Glyph>,
}

impl ReferenceSet {
    /// Loads `manifest.json` and its images from `dir`.
    ///
    /// Glyph images are binarized with `text_threshold`, the same rule used
    /// on live frames.
    pub fn load(dir: &Path, text_threshold: u8) -> Result<Self, ReferenceError> {
        let manifest_path = dir.join("manifest.json");
        let contents = fs::read_to_string(&manifest_path).map_err(|source| ReferenceError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let manifest: Manifest =
            serde_json::from_str(&contents).map_err(|source| ReferenceError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;

        if manifest.version != MANIFEST_VERSION {
            return Err(ReferenceError::Invalid(format!(
                "manifest version {} (expected {})",
                manifest.version, MANIFEST_VERSION
            )));
        }

        let mut signatures = Vec::with_capacity(manifest.signatures.len());
        for entry in manifest.signatures {
            let image = load_rgb(&dir.join(&entry.template))?;
            let template = Template::from_luma(&to_luma(&image)).ok_or_else(|| {
                ReferenceError::Invalid(format!("signature '{}' has no contrast", entry.name))
            })?;
            signatures.push(Signature {
                name: entry.name,
                kind: entry.state,
                x: entry.x,
                y: entry.y,
                template,
            });
        }

        let mut glyphs = Vec::with_capacity(manifest.glyphs.len());
        for entry in manifest.glyphs {
            let image = load_rgb(&dir.join(&entry.template))?;
            if image.dimensions() != (manifest.digits.cell_width, manifest.digits.cell_height) {
                return Err(ReferenceError::Invalid(format!(
                    "glyph '{}' is {}x{}, cells are {}x{}",
                    entry.symbol,
                    image.width(),
                    image.height(),
                    manifest.digits.cell_width,
                    manifest.digits.cell_height
                )));
            }
            let whole = Region {
                x: 0,
                y: 0,
                width: image.width(),
                height: image.height(),
            };
            glyphs.push(Glyph {
                symbol: entry.symbol,
                mask: bright_mask(&image, whole, text_threshold),
            });
        }

        Self::from_parts(
            manifest.frame_width,
            manifest.frame_height,
            signatures,
            manifest.digits,
            glyphs,
        )
    }

    /// Assembles and validates a reference set.
    pub fn from_parts(
        frame_width: u32,
        frame_height: u32,
        signatures: Vec<Signature>,
        grid: DigitGrid,
        glyphs: Vec<Glyph>,
    ) -> Result<Self, ReferenceError> {
        if signatures.is_empty() {
            return Err(ReferenceError::Invalid("no signatures".to_string()));
        }
        for sig in &signatures {
            if sig.kind == ScreenKind::Unknown {
                return Err(ReferenceError::Invalid(format!(
                    "signature '{}' maps to the unknown state",
                    sig.name
                )));
            }
            let region = Region {
                x: sig.x,
                y: sig.y,
                width: sig.template.width(),
                height: sig.template.height(),
            };
            if !region.fits(frame_width, frame_height) {
                return Err(ReferenceError::Invalid(format!(
                    "signature '{}' lies outside the {}x{} frame",
                    sig.name, frame_width, frame_height
                )));
            }
        }

        if grid.cells == 0 || grid.cell_width == 0 || grid.cell_height == 0 {
            return Err(ReferenceError::Invalid("empty digit grid".to_string()));
        }
        if !grid.cell(grid.cells - 1).fits(frame_width, frame_height) {
            return Err(ReferenceError::Invalid(
                "digit grid lies outside the frame".to_string(),
            ));
        }

        let cell_len = (grid.cell_width * grid.cell_height) as usize;
        if !glyphs.iter().any(|g| g.symbol.is_ascii_digit()) {
            return Err(ReferenceError::Invalid("no digit glyphs".to_string()));
        }
        for glyph in &glyphs {
            if glyph.mask.len() != cell_len {
                return Err(ReferenceError::Invalid(format!(
                    "glyph '{}' does not match the cell size",
                    glyph.symbol
                )));
            }
            if !glyph.mask.iter().any(|&on| on) {
                return Err(ReferenceError::Invalid(format!(
                    "glyph '{}' is blank at this text threshold",
                    glyph.symbol
                )));
            }
        }

        Ok(Self {
            frame_width,
            frame_height,
            signatures,
            grid,
            glyphs,
        })
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage, ReferenceError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| ReferenceError::Image {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::synthetic;

    #[test]
    fn test_load_written_reference_set() {
        let dir = tempfile::tempdir().unwrap();
        synthetic::write_reference_dir(dir.path()).unwrap();

        let refs = ReferenceSet::load(dir.path(), synthetic::TEXT_THRESHOLD).unwrap();
        assert_eq!((refs.frame_width, refs.frame_height), (910, 600));
        let order: Vec<ScreenKind> = refs.signatures.iter().map(|s| s.kind).collect();
        assert_eq!(
            order,
            vec![
                ScreenKind::TryAgain,
                ScreenKind::Fault,
                ScreenKind::Result,
                ScreenKind::Ready,
                ScreenKind::InProgress
            ]
        );
        assert_eq!(refs.glyphs.len(), 12);
    }

    #[test]
    fn test_shipped_manifest_parses() {
        let manifest: Manifest =
            serde_json::from_str(include_str!("../../templates/manifest.json")).unwrap();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(manifest.signatures[0].state, ScreenKind::TryAgain);
        assert_eq!(manifest.signatures.len(), 5);
        assert!(manifest.glyphs.iter().any(|g| g.symbol == '.'));
        assert!(manifest.digits.cell(manifest.digits.cells - 1).fits(
            manifest.frame_width,
            manifest.frame_height
        ));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ReferenceSet::load(dir.path(), 160),
            Err(ReferenceError::Io { .. })
        ));
    }

    #[test]
    fn test_wrong_manifest_version() {
        let dir = tempfile::tempdir().unwrap();
        synthetic::write_reference_dir(dir.path()).unwrap();
        let path = dir.path().join("manifest.json");
        let patched = fs::read_to_string(&path)
            .unwrap()
            .replace("\"version\": 1", "\"version\": 7");
        fs::write(&path, patched).unwrap();

        assert!(matches!(
            ReferenceSet::load(dir.path(), synthetic::TEXT_THRESHOLD),
            Err(ReferenceError::Invalid(_))
        ));
    }

    #[test]
    fn test_grid_outside_frame_rejected() {
        let refs = synthetic::reference_set();
        let grid = DigitGrid {
            x: 900,
            ..refs.grid
        };
        assert!(ReferenceSet::from_parts(910, 600, refs.signatures, grid, refs.glyphs).is_err());
    }
}
