//! Line-oriented actuation protocol shared by the host and the microcontroller.
//!
//! This module provides:
//! - `TrialParameters`, the seven timing fields of one run
//! - The run-command codec (`encode` / `decode`) and the `Command` set
//! - Firmware responses and their host-side pattern matching
//! - A fixed-capacity `LineBuffer` for assembling incoming lines
//!
//! Nothing in here allocates on the decode path, so the same code serves the
//! firmware and the host.

pub mod codec;
pub mod line_buffer;
pub mod params;
pub mod response;

pub use codec::{decode, encode, Command, CommandFrame, Direction, ManualAction};
pub use line_buffer::{LineBuffer, MAX_COMMAND_LEN};
pub use params::{TrialParameters, FIELD_COUNT, MAX_FIELD_VALUE};
pub use response::{Response, ResponsePatterns};

use thiserror::Error;

/// What was wrong with a rejected command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformation {
    #[error("expected {expected} parameters, got {got}")]
    FieldCount { expected: usize, got: usize },
    /// Field numbers are 1-based, matching the firmware's messages.
    #[error("parameter {field} is not an integer")]
    NotNumeric { field: usize },
    #[error("parameter {field} is out of range ({value})")]
    OutOfRange { field: usize, value: i64 },
    #[error("command too long")]
    TooLong,
    #[error("unknown command")]
    UnknownCommand,
}

/// A command line that violates the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("malformed command: {0}")]
pub struct MalformedCommand(pub Malformation);

impl From<Malformation> for MalformedCommand {
    fn from(kind: Malformation) -> Self {
        MalformedCommand(kind)
    }
}
