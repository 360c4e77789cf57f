//! Append-only CSV runlog.
//!
//! Every row is built in memory, written with a single `write_all` and synced
//! before `append` returns, so a crash can only leave a torn final line. That
//! line is cut off the next time the log is opened.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use super::PersistenceError;
use crate::campaign::{TrialOutcome, TrialStatus};
use crate::protocol::TrialParameters;

pub const RUNLOG_HEADER: &str = "trial,timestamp,status,distance,initial_fire_ms,initial_skip_ms,num_steps,step_fire_ms,step_skip_ms,pre_throw_skip_ms,throw_ms,frame_count,replay";

const COLUMNS: usize = 13;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct Runlog {
    path: PathBuf,
    file: File,
    next_trial: u64,
}

impl Runlog {
    /// Opens or creates the runlog at `path`.
    ///
    /// Writes the header into an empty file, drops a torn final line and
    /// resumes trial numbering after the highest recorded id.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(PersistenceError::io(path))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(PersistenceError::io(path))?;

        let intact = match contents.last() {
            None | Some(b'\n') => contents.len(),
            Some(_) => contents
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |pos| pos + 1),
        };
        if intact < contents.len() {
            warn!(
                "Runlog {}: dropping {} bytes of a torn final row",
                path.display(),
                contents.len() - intact
            );
            file.set_len(intact as u64)
                .and_then(|_| file.sync_data())
                .map_err(PersistenceError::io(path))?;
        }

        let text = String::from_utf8_lossy(&contents[..intact]);
        let mut lines = text.lines();
        match lines.next() {
            None => {
                file.write_all(format!("{}\n", RUNLOG_HEADER).as_bytes())
                    .and_then(|_| file.sync_data())
                    .map_err(PersistenceError::io(path))?;
            }
            Some(header) if header.trim_end() == RUNLOG_HEADER => {}
            Some(_) => {
                return Err(PersistenceError::Header {
                    path: path.to_path_buf(),
                })
            }
        }

        let last_trial = lines
            .filter_map(|line| line.split(',').next()?.parse::<u64>().ok())
            .max();
        let next_trial = last_trial.map_or(1, |id| id + 1);
        info!(
            "Runlog {}: next trial is {}",
            path.display(),
            next_trial
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_trial,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id the next trial should use.
    pub fn next_trial_id(&self) -> u64 {
        self.next_trial
    }

    /// Writes one complete row and syncs it to disk.
    pub fn append(&mut self, outcome: &TrialOutcome) -> Result<(), PersistenceError> {
        let row = format_row(outcome);
        self.file
            .write_all(row.as_bytes())
            .and_then(|_| self.file.sync_data())
            .map_err(PersistenceError::io(&self.path))?;
        self.next_trial = self.next_trial.max(outcome.trial_id + 1);
        Ok(())
    }

    /// Parses every row of a runlog. Malformed rows are skipped with a warning.
    pub fn read_all(path: &Path) -> Result<Vec<TrialOutcome>> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read runlog {}", path.display()))?;

        let mut outcomes = Vec::new();
        for (line_num, line) in text.lines().enumerate() {
            if line_num == 0 || line.trim().is_empty() {
                continue;
            }
            match parse_row(line) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(
                    "Skipping malformed runlog row {}: {:#}",
                    line_num + 1,
                    e
                ),
            }
        }
        Ok(outcomes)
    }
}

fn format_row(outcome: &TrialOutcome) -> String {
    let p = &outcome.parameters;
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
        outcome.trial_id,
        outcome.timestamp.format(TIMESTAMP_FORMAT),
        outcome.status,
        outcome
            .distance
            .map(|d| format!("{:.2}", d))
            .unwrap_or_default(),
        p.initial_fire_ms().map_or(-1, i64::from),
        p.initial_skip_ms(),
        p.num_steps(),
        p.step_fire_ms(),
        p.step_skip_ms(),
        p.pre_throw_skip_ms(),
        p.throw_ms(),
        outcome.frame_count,
        outcome.replay.as_deref().unwrap_or(""),
    )
}

fn parse_row(line: &str) -> Result<TrialOutcome> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != COLUMNS {
        return Err(anyhow!("Expected {} columns, got {}", COLUMNS, parts.len()));
    }

    let field = |idx: usize| -> Result<u32> {
        parts[idx]
            .parse::<u32>()
            .with_context(|| format!("Invalid value in column {}", idx + 1))
    };

    let trial_id = parts[0].parse::<u64>().context("Invalid trial id")?;
    let timestamp = NaiveDateTime::parse_from_str(parts[1], TIMESTAMP_FORMAT)
        .context("Invalid timestamp")?
        .and_local_timezone(Local)
        .earliest()
        .ok_or_else(|| anyhow!("Timestamp does not exist in local time"))?;
    let status: TrialStatus = parts[2].parse().map_err(|e: String| anyhow!(e))?;
    let distance = match parts[3] {
        "" => None,
        text => Some(text.parse::<f64>().context("Invalid distance")?),
    };
    let initial_fire_ms = match parts[4] {
        "-1" => None,
        _ => Some(field(4)?),
    };
    let parameters = TrialParameters::new(
        initial_fire_ms,
        field(5)?,
        field(6)?,
        field(7)?,
        field(8)?,
        field(9)?,
        field(10)?,
    )
    .map_err(|e| anyhow!("Invalid parameters: {}", e))?;
    let frame_count = parts[11].parse::<u64>().context("Invalid frame count")?;
    let replay = Some(parts[12].to_string()).filter(|name| !name.is_empty());

    Ok(TrialOutcome {
        trial_id,
        parameters,
        status,
        succeeded: status == TrialStatus::Measured,
        distance,
        frame_count,
        replay,
        timestamp,
    })
}
