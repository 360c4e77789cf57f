//! Host side of the controller link.
//!
//! The orchestrator talks to the microcontroller through [`ControllerLink`]:
//! send one command, then read status lines with a bounded wait. Two
//! implementations exist: [`SerialLink`] for the real board and
//! [`SimulatedController`], which runs the firmware state machine in-process.

pub mod serial;
pub mod simulated;

pub use serial::SerialLink;
pub use simulated::SimulatedController;

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::protocol::Command;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// How long a drain waits for each further line.
const DRAIN_WINDOW: Duration = Duration::from_millis(20);
/// Upper bounds on one drain, so a chattering board cannot stall the caller.
pub const DRAIN_MAX_LINES: usize = 64;
pub const DRAIN_BUDGET: Duration = Duration::from_millis(500);

pub trait ControllerLink {
    /// Writes one newline-terminated command.
    fn send(&mut self, command: &Command) -> Result<(), LinkError>;

    /// Waits up to `timeout` for one complete status line.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. The line has its
    /// terminator stripped.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError>;

    /// Discards whatever the board has already sent, returning it.
    ///
    /// Stops after [`DRAIN_MAX_LINES`] lines or [`DRAIN_BUDGET`], whichever
    /// comes first.
    fn drain(&mut self) -> Result<Vec<String>, LinkError> {
        let deadline = Instant::now() + DRAIN_BUDGET;
        let mut lines = Vec::new();
        while lines.len() < DRAIN_MAX_LINES && Instant::now() < deadline {
            match self.read_line(DRAIN_WINDOW)? {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        Ok(lines)
    }
}
