//! Replay worker thread.
//!
//! The orchestrator streams frames over an mpsc channel while a trial runs;
//! this thread encodes them so JPEG and disk latency never delay result
//! detection. At most one replay is open at a time.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};

use tracing::{debug, info, warn};

use super::replay::ReplayWriter;
use crate::capture::Frame;

/// Instructions for the replay worker, in trial order.
#[derive(Debug)]
pub enum ReplayJob {
    /// Opens a new archive. A replay still open is discarded.
    Begin { trial_id: u64, command: String },
    Frame(Frame),
    /// Completes the open archive under this file name.
    Finish { file_name: String },
    /// Drops the open archive without writing it.
    Discard,
}

/// Creates the channel between the orchestrator and the worker.
///
/// Unbounded: frames queue up if encoding falls behind capture.
pub fn create_replay_queue() -> (Sender<ReplayJob>, Receiver<ReplayJob>) {
    channel()
}

/// Processes jobs until every sender is dropped.
///
/// Write failures are logged and lose only the replay they belong to.
pub fn run_replay_worker(receiver: Receiver<ReplayJob>, replays_dir: PathBuf, quality: u8) {
    info!("Replay worker started");
    let mut open: Option<ReplayWriter> = None;

    while let Ok(job) = receiver.recv() {
        match job {
            ReplayJob::Begin { trial_id, command } => {
                if let Some(stale) = open.take() {
                    warn!("Replay for trial {} was never finished, discarding", stale.trial_id());
                }
                match ReplayWriter::create(&replays_dir, trial_id, &command, quality) {
                    Ok(writer) => open = Some(writer),
                    Err(e) => warn!("Trial {}: cannot start replay: {}", trial_id, e),
                }
            }
            ReplayJob::Frame(frame) => {
                let Some(writer) = open.as_mut() else {
                    continue;
                };
                if let Err(e) = writer.add_frame(&frame) {
                    warn!(
                        "Trial {}: replay frame {} failed, dropping replay: {}",
                        writer.trial_id(),
                        frame.index,
                        e
                    );
                    open = None;
                }
            }
            ReplayJob::Finish { file_name } => {
                let Some(writer) = open.take() else {
                    warn!("No replay open for {}", file_name);
                    continue;
                };
                let trial_id = writer.trial_id();
                let frames = writer.frame_count();
                match writer.finish(&replays_dir.join(&file_name)) {
                    Ok(()) => info!("Trial {}: replay saved ({} frames): {}", trial_id, frames, file_name),
                    Err(e) => warn!("Trial {}: failed to save replay {}: {}", trial_id, file_name, e),
                }
            }
            ReplayJob::Discard => {
                if let Some(writer) = open.take() {
                    debug!("Trial {}: replay discarded", writer.trial_id());
                }
            }
        }
    }

    if let Some(writer) = open {
        warn!("Replay worker: trial {} still open at shutdown, discarding", writer.trial_id());
    }
    info!("Replay worker finished");
}
