//! Per-trial records: lifecycle phases, terminal status and the outcome row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};

use crate::protocol::TrialParameters;

/// Lifecycle of one trial, for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    Sampling,
    Sent,
    AwaitingResult,
    Recorded,
    TimedOut,
    Rejected,
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialPhase::Sampling => write!(f, "Sampling"),
            TrialPhase::Sent => write!(f, "Sent"),
            TrialPhase::AwaitingResult => write!(f, "Awaiting result"),
            TrialPhase::Recorded => write!(f, "Recorded"),
            TrialPhase::TimedOut => write!(f, "Timed out"),
            TrialPhase::Rejected => write!(f, "Rejected"),
        }
    }
}

/// How a trial ended, as written to the runlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrialStatus {
    /// Result screen with a readable distance
    Measured,
    /// Foul banner instead of a distance
    Fault,
    /// Result screen whose digits could not be read
    Unreadable,
    TimedOut,
    /// Firmware refused the command or never acknowledged it
    Rejected,
}

impl TrialStatus {
    pub const ALL: [TrialStatus; 5] = [
        TrialStatus::Measured,
        TrialStatus::Fault,
        TrialStatus::Unreadable,
        TrialStatus::TimedOut,
        TrialStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Measured => "measured",
            TrialStatus::Fault => "fault",
            TrialStatus::Unreadable => "unreadable",
            TrialStatus::TimedOut => "timed_out",
            TrialStatus::Rejected => "rejected",
        }
    }

    /// Terminal phase this status belongs to.
    pub fn phase(&self) -> TrialPhase {
        match self {
            TrialStatus::Measured | TrialStatus::Fault | TrialStatus::Unreadable => {
                TrialPhase::Recorded
            }
            TrialStatus::TimedOut => TrialPhase::TimedOut,
            TrialStatus::Rejected => TrialPhase::Rejected,
        }
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrialStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown trial status '{}'", s))
    }
}

/// Everything recorded about one trial. Appended to the runlog exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub trial_id: u64,
    pub parameters: TrialParameters,
    pub status: TrialStatus,
    pub succeeded: bool,
    /// Meters, present only for `Measured`
    pub distance: Option<f64>,
    pub frame_count: u64,
    /// Replay archive file name inside the replays directory
    pub replay: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl TrialOutcome {
    pub fn new(
        trial_id: u64,
        parameters: TrialParameters,
        status: TrialStatus,
        distance: Option<f64>,
        frame_count: u64,
        replay: Option<String>,
    ) -> Self {
        Self {
            trial_id,
            parameters,
            status,
            succeeded: status == TrialStatus::Measured,
            distance: distance.filter(|_| status == TrialStatus::Measured),
            frame_count,
            replay,
            timestamp: Local::now(),
        }
    }
}
