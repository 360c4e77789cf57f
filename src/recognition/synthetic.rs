//! Synthetic console screens for tests.
//!
//! Renders 910x600 frames with the same layout the reference manifest
//! describes: signature patches at fixed spots and a right-aligned distance
//! readout drawn with a 5x7 bitmap font scaled 3x into 18x24 cells.

use std::path::Path;

use image::{Rgb, RgbImage};
use serde_json::json;

use super::preprocess::{bright_mask, to_luma, Region};
use super::references::{DigitGrid, Glyph, ReferenceSet, Signature};
use super::signature::Template;
use super::{Recognizer, RecognizerSettings, ScreenKind};

pub const WIDTH: u32 = 910;
pub const HEIGHT: u32 = 600;
pub const TEXT_THRESHOLD: u8 = 160;

const BACKGROUND: Rgb<u8> = Rgb([16, 24, 48]);
const TEXT: Rgb<u8> = Rgb([235, 235, 235]);
const SCALE: u32 = 3;

pub const GRID: DigitGrid = DigitGrid {
    x: 766,
    y: 576,
    cell_width: 18,
    cell_height: 24,
    cells: 8,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen {
    Blank,
    Ready,
    InProgress,
    Result(f64),
    Fault,
    TryAgain(f64),
}

#[derive(Clone, Copy)]
enum Pattern {
    VerticalStripes,
    Checker,
    Diagonal,
    HorizontalStripes,
}

struct Patch {
    name: &'static str,
    kind: ScreenKind,
    region: Region,
    pattern: Pattern,
}

const READY_PATCH: Patch = Patch {
    name: "ready",
    kind: ScreenKind::Ready,
    region: Region { x: 440, y: 578, width: 60, height: 16 },
    pattern: Pattern::VerticalStripes,
};
const TRY_AGAIN_PATCH: Patch = Patch {
    name: "try-again",
    kind: ScreenKind::TryAgain,
    region: Region { x: 440, y: 578, width: 60, height: 16 },
    pattern: Pattern::Checker,
};
const FAULT_PATCH: Patch = Patch {
    name: "fault",
    kind: ScreenKind::Fault,
    region: Region { x: 700, y: 578, width: 48, height: 16 },
    pattern: Pattern::Diagonal,
};
const HUD_PATCH: Patch = Patch {
    name: "in-progress",
    kind: ScreenKind::InProgress,
    region: Region { x: 20, y: 20, width: 48, height: 16 },
    pattern: Pattern::HorizontalStripes,
};

fn font(symbol: char) -> Option<[&'static str; 7]> {
    Some(match symbol {
        '0' => ["01110", "10001", "10011", "10101", "11001", "10001", "01110"],
        '1' => ["00100", "01100", "00100", "00100", "00100", "00100", "01110"],
        '2' => ["01110", "10001", "00001", "00010", "00100", "01000", "11111"],
        '3' => ["11111", "00010", "00100", "00010", "00001", "10001", "01110"],
        '4' => ["00010", "00110", "01010", "10010", "11111", "00010", "00010"],
        '5' => ["11111", "10000", "11110", "00001", "00001", "10001", "01110"],
        '6' => ["00110", "01000", "10000", "11110", "10001", "10001", "01110"],
        '7' => ["11111", "00001", "00010", "00100", "01000", "01000", "01000"],
        '8' => ["01110", "10001", "10001", "01110", "10001", "10001", "01110"],
        '9' => ["01110", "10001", "10001", "01111", "00001", "00010", "01100"],
        '.' => ["00000", "00000", "00000", "00000", "00000", "01100", "01100"],
        'm' => ["00000", "00000", "11010", "10101", "10101", "10001", "10001"],
        _ => return None,
    })
}

const ALPHABET: [char; 12] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '.', 'm'];

fn fill(img: &mut RgbImage, region: Region, color: Rgb<u8>) {
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            img.put_pixel(x, y, color);
        }
    }
}

fn draw_patch(img: &mut RgbImage, patch: &Patch) {
    let r = patch.region;
    for y in 0..r.height {
        for x in 0..r.width {
            let on = match patch.pattern {
                Pattern::VerticalStripes => (x / 3) % 2 == 0,
                Pattern::Checker => (x / 4 + y / 4) % 2 == 0,
                Pattern::Diagonal => ((x + y) / 3) % 2 == 0,
                Pattern::HorizontalStripes => (y / 2) % 2 == 0,
            };
            let v = if on { 200 } else { 40 };
            img.put_pixel(r.x + x, r.y + y, Rgb([v, v, v]));
        }
    }
}

fn draw_glyph(img: &mut RgbImage, cell: Region, symbol: char) {
    let Some(rows) = font(symbol) else {
        return;
    };
    for (row, bits) in rows.iter().enumerate() {
        for (col, bit) in bits.chars().enumerate() {
            if bit != '1' {
                continue;
            }
            let dot = Region {
                x: cell.x + 1 + col as u32 * SCALE,
                y: cell.y + 1 + row as u32 * SCALE,
                width: SCALE,
                height: SCALE,
            };
            fill(img, dot, TEXT);
        }
    }
}

/// Draws `text` right-aligned in the distance grid.
fn draw_readout(img: &mut RgbImage, text: &str) {
    let chars: Vec<char> = text.chars().collect();
    let cells = GRID.cells as usize;
    let shown = &chars[chars.len().saturating_sub(cells)..];
    let start = cells - shown.len();
    for (i, symbol) in shown.iter().enumerate() {
        draw_glyph(img, GRID.cell((start + i) as u32), *symbol);
    }
}

/// Renders one screen.
pub fn render(screen: Screen) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    match screen {
        Screen::Blank => {}
        Screen::Ready => draw_patch(&mut img, &READY_PATCH),
        Screen::InProgress => draw_patch(&mut img, &HUD_PATCH),
        Screen::Result(distance) => {
            draw_patch(&mut img, &HUD_PATCH);
            draw_readout(&mut img, &format!("{:.2}m", distance));
        }
        Screen::Fault => draw_patch(&mut img, &FAULT_PATCH),
        Screen::TryAgain(distance) => {
            draw_patch(&mut img, &TRY_AGAIN_PATCH);
            draw_readout(&mut img, &format!("{:.2}m", distance));
        }
    }
    img
}

/// Floods one readout cell with text color, producing an unreadable glyph.
pub fn smudge_cell(mut img: RgbImage, cell: u32) -> RgbImage {
    fill(&mut img, GRID.cell(cell), TEXT);
    img
}

/// Clears one readout cell to the background, as if its glyph was lost.
pub fn blank_cell(mut img: RgbImage, cell: u32) -> RgbImage {
    fill(&mut img, GRID.cell(cell), BACKGROUND);
    img
}

fn crop(img: &RgbImage, region: Region) -> RgbImage {
    image::imageops::crop_imm(img, region.x, region.y, region.width, region.height).to_image()
}

/// The `m` cell at the end of the readout identifies the result screen.
fn result_region() -> Region {
    GRID.cell(GRID.cells - 1)
}

/// Signature images cut from rendered screens, in match order.
fn signature_images() -> Vec<(&'static str, ScreenKind, Region, RgbImage)> {
    let result_frame = render(Screen::Result(1.0));
    let mut out = Vec::new();
    for (patch, screen) in [
        (&TRY_AGAIN_PATCH, Screen::TryAgain(1.0)),
        (&FAULT_PATCH, Screen::Fault),
    ] {
        out.push((patch.name, patch.kind, patch.region, crop(&render(screen), patch.region)));
    }
    out.push(("result", ScreenKind::Result, result_region(), crop(&result_frame, result_region())));
    for (patch, screen) in [(&READY_PATCH, Screen::Ready), (&HUD_PATCH, Screen::InProgress)] {
        out.push((patch.name, patch.kind, patch.region, crop(&render(screen), patch.region)));
    }
    out
}

fn glyph_images() -> Vec<(char, RgbImage)> {
    ALPHABET
        .iter()
        .map(|&symbol| {
            let cell = Region {
                x: 0,
                y: 0,
                width: GRID.cell_width,
                height: GRID.cell_height,
            };
            let mut img = RgbImage::from_pixel(cell.width, cell.height, BACKGROUND);
            draw_glyph(&mut img, cell, symbol);
            (symbol, img)
        })
        .collect()
}

/// In-memory reference set matching [`render`].
pub fn reference_set() -> ReferenceSet {
    let signatures = signature_images()
        .into_iter()
        .map(|(name, kind, region, img)| Signature {
            name: name.to_string(),
            kind,
            x: region.x,
            y: region.y,
            template: Template::from_luma(&to_luma(&img)).unwrap(),
        })
        .collect();
    let glyphs = glyph_images()
        .into_iter()
        .map(|(symbol, img)| {
            let whole = Region {
                x: 0,
                y: 0,
                width: img.width(),
                height: img.height(),
            };
            Glyph {
                symbol,
                mask: bright_mask(&img, whole, TEXT_THRESHOLD),
            }
        })
        .collect();
    ReferenceSet::from_parts(WIDTH, HEIGHT, signatures, GRID, glyphs).unwrap()
}

pub fn settings() -> RecognizerSettings {
    RecognizerSettings {
        similarity_threshold: 0.95,
        search_margin: 2,
        glyph_tolerance: 0.15,
        text_threshold: TEXT_THRESHOLD,
    }
}

pub fn recognizer() -> Recognizer {
    Recognizer::new(reference_set(), settings())
}

/// Writes PNGs and a manifest for [`ReferenceSet::load`].
pub fn write_reference_dir(dir: &Path) -> anyhow::Result<()> {
    let mut signatures = Vec::new();
    for (name, kind, region, img) in signature_images() {
        let file = format!("{}.png", name);
        img.save(dir.join(&file))?;
        let state = match kind {
            ScreenKind::TryAgain => "try_again",
            ScreenKind::Fault => "fault",
            ScreenKind::Result => "result",
            ScreenKind::Ready => "ready",
            ScreenKind::InProgress => "in_progress",
            ScreenKind::Unknown => "unknown",
        };
        signatures.push(json!({
            "name": name,
            "state": state,
            "x": region.x,
            "y": region.y,
            "template": file,
        }));
    }

    let mut glyphs = Vec::new();
    for (symbol, img) in glyph_images() {
        let file = match symbol {
            '.' => "glyph-dot.png".to_string(),
            other => format!("glyph-{}.png", other),
        };
        img.save(dir.join(&file))?;
        glyphs.push(json!({ "symbol": symbol.to_string(), "template": file }));
    }

    let manifest = json!({
        "version": 1,
        "frame_width": WIDTH,
        "frame_height": HEIGHT,
        "signatures": signatures,
        "digits": {
            "x": GRID.x,
            "y": GRID.y,
            "cell_width": GRID.cell_width,
            "cell_height": GRID.cell_height,
            "cells": GRID.cells,
        },
        "glyphs": glyphs,
    });
    std::fs::write(dir.join("manifest.json"), serde_json::to_string_pretty(&manifest)?)?;
    Ok(())
}
