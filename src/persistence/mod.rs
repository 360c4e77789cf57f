//! Durable output of a campaign.
//!
//! - `runlog`: append-only CSV, one synced row per trial
//! - `replay`: zip archive of JPEG frames per trial
//! - `replay_worker`: background thread that writes replays off the
//!   orchestrator's path

pub mod replay;
pub mod replay_worker;
pub mod runlog;

pub use replay::{replay_file_name, ReplayWriter, REPLAY_MANIFEST_NAME};
pub use replay_worker::{create_replay_queue, run_replay_worker, ReplayJob};
pub use runlog::{Runlog, RUNLOG_HEADER};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a runlog (unexpected header)")]
    Header { path: PathBuf },
    #[error("replay archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("replay manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PersistenceError::Io { path, source }
    }
}
