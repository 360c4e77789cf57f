//! Replay archives: one zip per trial holding its frames as JPEGs.
//!
//! Frames are streamed into a temporary file next to the destination and
//! the archive is renamed into place only when it is complete, so a replay
//! either exists whole or not at all.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::PersistenceError;
use crate::campaign::TrialStatus;
use crate::capture::Frame;
use crate::protocol::TrialParameters;

pub const REPLAY_MANIFEST_NAME: &str = "replay.json";

/// `{trial:06}-{label}-s{steps}-p{step_fire}.zip`, labelled with the
/// distance when there is one and the status otherwise.
pub fn replay_file_name(
    trial_id: u64,
    status: TrialStatus,
    distance: Option<f64>,
    params: &TrialParameters,
) -> String {
    let label = match (status, distance) {
        (TrialStatus::Measured, Some(d)) => format!("{:.2}", d),
        (TrialStatus::TimedOut, _) => "timeout".to_string(),
        (other, _) => other.to_string(),
    };
    format!(
        "{:06}-{}-s{}-p{}.zip",
        trial_id,
        label,
        params.num_steps(),
        params.step_fire_ms()
    )
}

#[derive(Debug, Serialize)]
struct ReplayFrame {
    index: u64,
    offset_ms: u64,
}

#[derive(Debug, Serialize)]
struct ReplayManifest<'a> {
    trial: u64,
    command: &'a str,
    frames: &'a [ReplayFrame],
}

/// An archive being written for one trial.
pub struct ReplayWriter {
    trial_id: u64,
    command: String,
    zip: ZipWriter<NamedTempFile>,
    frames: Vec<ReplayFrame>,
    first_at: Option<Instant>,
    quality: u8,
}

impl ReplayWriter {
    /// Starts an archive in `dir`. Nothing is visible there until
    /// [`ReplayWriter::finish`].
    pub fn create(
        dir: &Path,
        trial_id: u64,
        command: &str,
        quality: u8,
    ) -> Result<Self, PersistenceError> {
        let tmp = NamedTempFile::new_in(dir).map_err(PersistenceError::io(dir))?;
        Ok(Self {
            trial_id,
            command: command.to_string(),
            zip: ZipWriter::new(tmp),
            frames: Vec::new(),
            first_at: None,
            quality,
        })
    }

    pub fn trial_id(&self) -> u64 {
        self.trial_id
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Appends one frame as `frame_NNNNN.jpg`.
    pub fn add_frame(&mut self, frame: &Frame) -> Result<(), PersistenceError> {
        let first_at = *self.first_at.get_or_insert(frame.captured_at);
        let name = format!("frame_{:05}.jpg", self.frames.len());

        // JPEG data does not compress further.
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.zip.start_file(name, options)?;
        JpegEncoder::new_with_quality(&mut self.zip, self.quality).encode_image(&*frame.image)?;

        self.frames.push(ReplayFrame {
            index: frame.index,
            offset_ms: frame
                .captured_at
                .saturating_duration_since(first_at)
                .as_millis() as u64,
        });
        Ok(())
    }

    /// Writes the manifest and moves the archive to `dest`.
    pub fn finish(mut self, dest: &Path) -> Result<(), PersistenceError> {
        let manifest = ReplayManifest {
            trial: self.trial_id,
            command: &self.command,
            frames: &self.frames,
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        self.zip
            .start_file(REPLAY_MANIFEST_NAME, SimpleFileOptions::default())?;
        self.zip.write_all(&json).map_err(PersistenceError::io(dest))?;

        let tmp = self.zip.finish()?;
        tmp.persist(dest)
            .map_err(|e| PersistenceError::io(dest)(e.error))?;
        Ok(())
    }
}
