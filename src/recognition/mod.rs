//! Screen-state recognition from fixed pixel regions.
//!
//! The console renders at a fixed resolution with a bitmap font, so no
//! general OCR is involved:
//! - Coarse state: the first reference signature (in manifest order) whose
//!   correlation with its region exceeds the similarity threshold
//! - Distance: a fixed grid of character cells, each matched against the
//!   reference glyphs by binary mask distance
//!
//! Both are pure functions of the frame.

pub mod glyphs;
pub mod preprocess;
pub mod references;
pub mod signature;

#[cfg(test)]
pub mod synthetic;

pub use references::{DigitGrid, Glyph, ReferenceError, ReferenceSet, Signature};

use std::fmt;

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;

use crate::config::RecognitionConfig;

/// Coarse screen classification, without the distance payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenKind {
    Unknown,
    /// Practice menu, ready for a run
    Ready,
    /// Run-up and flight
    InProgress,
    /// Distance readout
    Result,
    /// Foul throw banner
    Fault,
    /// Prompt shown after a result
    TryAgain,
}

impl fmt::Display for ScreenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenKind::Unknown => write!(f, "Unknown"),
            ScreenKind::Ready => write!(f, "Ready"),
            ScreenKind::InProgress => write!(f, "In progress"),
            ScreenKind::Result => write!(f, "Result"),
            ScreenKind::Fault => write!(f, "Fault"),
            ScreenKind::TryAgain => write!(f, "Try again"),
        }
    }
}

/// Full classification of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenState {
    Unknown,
    Ready,
    InProgress,
    /// Distance in meters
    Result(f64),
    Fault,
    TryAgain,
}

impl ScreenState {
    pub fn kind(&self) -> ScreenKind {
        match self {
            ScreenState::Unknown => ScreenKind::Unknown,
            ScreenState::Ready => ScreenKind::Ready,
            ScreenState::InProgress => ScreenKind::InProgress,
            ScreenState::Result(_) => ScreenKind::Result,
            ScreenState::Fault => ScreenKind::Fault,
            ScreenState::TryAgain => ScreenKind::TryAgain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecognitionError {
    #[error("frame is {got:?}, references expect {expected:?}")]
    FrameSize {
        expected: (u32, u32),
        got: (u32, u32),
    },
    /// 0-based cell index; `distance` is the best glyph's mismatch fraction.
    #[error("unrecognized glyph in cell {cell} (best distance {distance:.3})")]
    UnrecognizedGlyph { cell: usize, distance: f32 },
    #[error("unreadable distance '{0}'")]
    UnreadableDistance(String),
}

/// Matching thresholds, taken from [`RecognitionConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RecognizerSettings {
    pub similarity_threshold: f32,
    pub search_margin: u32,
    pub glyph_tolerance: f32,
    pub text_threshold: u8,
}

impl From<&RecognitionConfig> for RecognizerSettings {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            search_margin: config.search_margin,
            glyph_tolerance: config.glyph_tolerance,
            text_threshold: config.text_threshold,
        }
    }
}

pub struct Recognizer {
    refs: ReferenceSet,
    settings: RecognizerSettings,
}

impl Recognizer {
    pub fn new(refs: ReferenceSet, settings: RecognizerSettings) -> Self {
        Self { refs, settings }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.refs.frame_width, self.refs.frame_height)
    }

    fn check_size(&self, frame: &RgbImage) -> Result<(), RecognitionError> {
        let expected = self.frame_size();
        if frame.dimensions() != expected {
            return Err(RecognitionError::FrameSize {
                expected,
                got: frame.dimensions(),
            });
        }
        Ok(())
    }

    /// Coarse state of a frame; the first matching signature wins.
    pub fn classify(&self, frame: &RgbImage) -> Result<ScreenKind, RecognitionError> {
        self.check_size(frame)?;
        let matched = self.refs.signatures.iter().find(|sig| {
            sig.template
                .best_match(frame, sig.x, sig.y, self.settings.search_margin)
                > self.settings.similarity_threshold
        });
        Ok(matched.map_or(ScreenKind::Unknown, |sig| sig.kind))
    }

    /// Reads the distance readout. Only meaningful on a result screen.
    pub fn read_distance(&self, frame: &RgbImage) -> Result<f64, RecognitionError> {
        self.check_size(frame)?;
        let text = glyphs::read_cells(
            frame,
            &self.refs.grid,
            &self.refs.glyphs,
            self.settings.text_threshold,
            self.settings.glyph_tolerance,
        )?;
        glyphs::parse_distance(&text)
    }

    /// Classifies a frame and, on a result screen, extracts the distance.
    pub fn recognize(&self, frame: &RgbImage) -> Result<ScreenState, RecognitionError> {
        Ok(match self.classify(frame)? {
            ScreenKind::Unknown => ScreenState::Unknown,
            ScreenKind::Ready => ScreenState::Ready,
            ScreenKind::InProgress => ScreenState::InProgress,
            ScreenKind::Result => ScreenState::Result(self.read_distance(frame)?),
            ScreenKind::Fault => ScreenState::Fault,
            ScreenKind::TryAgain => ScreenState::TryAgain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::synthetic::{self, Screen};
    use super::*;

    fn recognizer() -> Recognizer {
        synthetic::recognizer()
    }

    #[test]
    fn test_classifies_every_screen() {
        let r = recognizer();
        assert_eq!(r.recognize(&synthetic::render(Screen::Blank)).unwrap(), ScreenState::Unknown);
        assert_eq!(r.recognize(&synthetic::render(Screen::Ready)).unwrap(), ScreenState::Ready);
        assert_eq!(
            r.recognize(&synthetic::render(Screen::InProgress)).unwrap(),
            ScreenState::InProgress
        );
        assert_eq!(r.recognize(&synthetic::render(Screen::Fault)).unwrap(), ScreenState::Fault);
        assert_eq!(
            r.recognize(&synthetic::render(Screen::TryAgain(87.45))).unwrap(),
            ScreenState::TryAgain
        );
    }

    #[test]
    fn test_reads_rendered_distance() {
        let r = recognizer();
        let frame = synthetic::render(Screen::Result(87.45));
        assert_eq!(r.recognize(&frame).unwrap(), ScreenState::Result(87.45));
    }

    #[test]
    fn test_reads_various_distances() {
        let r = recognizer();
        for distance in [0.5, 3.07, 64.2, 99.99, 103.6] {
            let frame = synthetic::render(Screen::Result(distance));
            assert_eq!(r.read_distance(&frame).unwrap(), distance, "distance {}", distance);
        }
    }

    #[test]
    fn test_result_beats_in_progress_hud() {
        // The result screen keeps the run HUD visible; manifest order decides.
        let r = recognizer();
        let frame = synthetic::render(Screen::Result(12.34));
        assert_eq!(r.classify(&frame).unwrap(), ScreenKind::Result);
    }

    #[test]
    fn test_recognition_is_deterministic() {
        let r = recognizer();
        let frame = synthetic::render(Screen::Result(87.45));
        let first = r.recognize(&frame);
        for _ in 0..3 {
            assert_eq!(r.recognize(&frame), first);
        }

        let smudged = synthetic::smudge_cell(synthetic::render(Screen::Result(87.45)), 4);
        let first = r.recognize(&smudged);
        assert!(matches!(first, Err(RecognitionError::UnrecognizedGlyph { cell: 4, .. })));
        assert_eq!(r.recognize(&smudged), first);
    }

    #[test]
    fn test_lost_decimal_point_is_not_misread() {
        let r = recognizer();
        // "87.45m" is right-aligned, so cell 4 holds the decimal point.
        let frame = synthetic::blank_cell(synthetic::render(Screen::Result(87.45)), 4);
        assert!(matches!(
            r.recognize(&frame),
            Err(RecognitionError::UnrecognizedGlyph { cell: 4, .. })
        ));
    }

    #[test]
    fn test_missing_decimals_are_unreadable() {
        let r = recognizer();
        // Losing the last digit leaves a gap before the unit.
        let frame = synthetic::blank_cell(synthetic::render(Screen::Result(87.45)), 6);
        assert!(matches!(
            r.recognize(&frame),
            Err(RecognitionError::UnrecognizedGlyph { cell: 6, .. })
        ));
    }

    #[test]
    fn test_wrong_frame_size() {
        let r = recognizer();
        let frame = RgbImage::new(1280, 720);
        assert_eq!(
            r.classify(&frame),
            Err(RecognitionError::FrameSize {
                expected: (910, 600),
                got: (1280, 720)
            })
        );
    }
}
