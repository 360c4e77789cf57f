use std::fmt;

use regex::Regex;

use super::codec::{decode, Direction, ManualAction};
use super::params::TrialParameters;
use super::{Malformation, MalformedCommand};

/// Status lines the firmware writes back over the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Echo of an accepted run command, sent before actuation starts.
    Running(TrialParameters),
    FinishedRun,
    Manual(ManualAction),
    UnknownCommand,
    ParameterCount { expected: usize, got: usize },
    /// Non-numeric or out-of-range field, 1-based.
    InvalidParameter { field: usize },
    CommandTooLong,
    /// Anything the host does not recognize (boot chatter, noise).
    Other(String),
}

impl Response {
    /// True for every acknowledgment that means the command was refused.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Response::UnknownCommand
                | Response::ParameterCount { .. }
                | Response::InvalidParameter { .. }
                | Response::CommandTooLong
        )
    }
}

impl From<MalformedCommand> for Response {
    fn from(err: MalformedCommand) -> Self {
        match err.0 {
            Malformation::FieldCount { expected, got } => Response::ParameterCount { expected, got },
            Malformation::NotNumeric { field } | Malformation::OutOfRange { field, .. } => {
                Response::InvalidParameter { field }
            }
            Malformation::TooLong => Response::CommandTooLong,
            Malformation::UnknownCommand => Response::UnknownCommand,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Running(params) => write!(f, "Running {}", super::encode(params)),
            Response::FinishedRun => f.write_str("Finished run"),
            Response::Manual(ManualAction::Fire) => f.write_str("Fire"),
            Response::Manual(ManualAction::Nudge(dir)) => {
                let name = match dir {
                    Direction::Up => "up",
                    Direction::Down => "down",
                    Direction::Left => "left",
                    Direction::Right => "right",
                };
                write!(f, "Move {}", name)
            }
            Response::UnknownCommand => f.write_str("Unknown command"),
            Response::ParameterCount { expected, got } => {
                write!(f, "Expected {} parameters, got {}", expected, got)
            }
            Response::InvalidParameter { field } => write!(f, "Invalid parameter {}", field),
            Response::CommandTooLong => f.write_str("Command too long"),
            Response::Other(line) => f.write_str(line),
        }
    }
}

const RUNNING_PATTERN: &str = r"(?i)^running\s+(.+)$";
const COUNT_PATTERN: &str = r"(?i)^expected\s+(\d+)\s+parameters?,\s*got\s+(\d+)";
const INVALID_PATTERN: &str = r"(?i)^invalid\s+parameter\s+(\d+)";
const MOVE_PATTERN: &str = r"(?i)^move\s+(up|down|left|right)\b";

/// Host-side matcher that turns firmware status lines back into [`Response`]s.
///
/// Matching is case-insensitive and tolerant of extra whitespace.
pub struct ResponsePatterns {
    running: Regex,
    count: Regex,
    invalid: Regex,
    movement: Regex,
}

impl ResponsePatterns {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            running: Regex::new(RUNNING_PATTERN)?,
            count: Regex::new(COUNT_PATTERN)?,
            invalid: Regex::new(INVALID_PATTERN)?,
            movement: Regex::new(MOVE_PATTERN)?,
        })
    }

    pub fn parse(&self, line: &str) -> Response {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();

        if lower.starts_with("finished run") {
            return Response::FinishedRun;
        }
        if lower.starts_with("unknown command") {
            return Response::UnknownCommand;
        }
        if lower.starts_with("command too long") {
            return Response::CommandTooLong;
        }
        if lower == "fire" {
            return Response::Manual(ManualAction::Fire);
        }

        if let Some(caps) = self.running.captures(line) {
            // An echo that does not decode is still shown, but carries no ack.
            return match decode(&caps[1]) {
                Ok(params) => Response::Running(params),
                Err(_) => Response::Other(line.to_string()),
            };
        }
        if let Some(caps) = self.count.captures(line) {
            if let (Ok(expected), Ok(got)) = (caps[1].parse(), caps[2].parse()) {
                return Response::ParameterCount { expected, got };
            }
        }
        if let Some(caps) = self.invalid.captures(line) {
            if let Ok(field) = caps[1].parse() {
                return Response::InvalidParameter { field };
            }
        }
        if let Some(caps) = self.movement.captures(line) {
            let dir = match caps[1].to_ascii_lowercase().as_str() {
                "up" => Direction::Up,
                "down" => Direction::Down,
                "left" => Direction::Left,
                _ => Direction::Right,
            };
            return Response::Manual(ManualAction::Nudge(dir));
        }

        Response::Other(line.to_string())
    }
}
