//! Campaign state machine.
//!
//! The campaign sequences through: Preparing → Sampling → Running →
//! CheckingLoop → Preparing ... Each step checks for cancellation first.
//! A trial itself runs Sent → AwaitingResult → Recorded / TimedOut /
//! Rejected inside [`CampaignContext::run_trial`].

use std::fmt;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::sampler::ParameterSampler;
use super::stats::CampaignStats;
use super::trial::{TrialOutcome, TrialPhase, TrialStatus};
use super::{CampaignError, Rig};
use crate::cancel::CancelToken;
use crate::capture::{CaptureError, Frame};
use crate::config::CampaignConfig;
use crate::link::ControllerLink;
use crate::persistence::{replay_file_name, ReplayJob, Runlog};
use crate::protocol::{encode, Command, ManualAction, Response, ResponsePatterns, TrialParameters};
use crate::recognition::{RecognitionError, ScreenKind, ScreenState};

#[derive(Debug, Clone, PartialEq)]
pub enum CampaignState {
    /// Not started yet
    Idle,
    /// Returning the console to the ready screen
    Preparing,
    /// Drawing the next parameter set
    Sampling,
    /// One trial in flight
    Running(TrialParameters),
    /// Deciding whether to continue
    CheckingLoop,
    /// Trial limit reached
    Complete,
    /// Stopped by the user
    Cancelled,
    /// Stopped by a fatal error
    Failed(String),
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignState::Idle => write!(f, "Idle"),
            CampaignState::Preparing => write!(f, "Preparing"),
            CampaignState::Sampling => write!(f, "Sampling"),
            CampaignState::Running(params) => write!(f, "Running {}", encode(params)),
            CampaignState::CheckingLoop => write!(f, "Checking loop"),
            CampaignState::Complete => write!(f, "Complete"),
            CampaignState::Cancelled => write!(f, "Cancelled"),
            CampaignState::Failed(msg) => write!(f, "Failed: {}", msg),
        }
    }
}

/// Firmware answer to a run command.
enum Ack {
    Accepted,
    Refused(Response),
    NoReply,
}

/// Terminal screen seen during a trial.
#[derive(Clone, Copy)]
struct Terminal {
    status: TrialStatus,
    distance: Option<f64>,
    /// End of the post-run capture window
    record_until: Instant,
}

struct Watch {
    status: TrialStatus,
    distance: Option<f64>,
    frame_count: u64,
}

pub struct CampaignContext<L> {
    pub state: CampaignState,
    rig: Rig<L>,
    sampler: ParameterSampler<StdRng>,
    patterns: ResponsePatterns,
    runlog: Runlog,
    replays: Sender<ReplayJob>,
    config: CampaignConfig,
    cancel: CancelToken,
    pub stats: CampaignStats,
    pub last_outcome: Option<TrialOutcome>,
    start_time: Instant,
}

impl<L: ControllerLink> CampaignContext<L> {
    pub fn new(
        rig: Rig<L>,
        sampler: ParameterSampler<StdRng>,
        runlog: Runlog,
        replays: Sender<ReplayJob>,
        config: CampaignConfig,
        cancel: CancelToken,
    ) -> Result<Self, CampaignError> {
        Ok(Self {
            state: CampaignState::Idle,
            rig,
            sampler,
            patterns: ResponsePatterns::new()?,
            runlog,
            replays,
            config,
            cancel,
            stats: CampaignStats::default(),
            last_outcome: None,
            start_time: Instant::now(),
        })
    }

    pub fn rig(&self) -> &Rig<L> {
        &self.rig
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(1))
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `Ok(true)` while the campaign should continue. Cancellation
    /// ends it with `Ok(false)`; any other error marks it failed and is
    /// returned.
    pub fn step(&mut self) -> Result<bool, CampaignError> {
        if self.cancel.is_cancelled() && !self.is_finished() {
            info!("Cancellation requested, stopping campaign");
            self.state = CampaignState::Cancelled;
            return Ok(false);
        }

        match self.advance() {
            Ok(more) => Ok(more),
            Err(CampaignError::Cancelled) => {
                info!("Cancelled during {}", self.state);
                self.state = CampaignState::Cancelled;
                Ok(false)
            }
            Err(e) => {
                self.state = CampaignState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.state,
            CampaignState::Complete | CampaignState::Cancelled | CampaignState::Failed(_)
        )
    }

    fn advance(&mut self) -> Result<bool, CampaignError> {
        match self.state.clone() {
            CampaignState::Idle => {
                match self.config.max_trials {
                    Some(limit) => info!("Starting campaign: {} trials", limit),
                    None => info!("Starting campaign: unlimited trials (Ctrl+C to stop)"),
                }
                self.state = CampaignState::Preparing;
                Ok(true)
            }

            CampaignState::Preparing => {
                if self.prepare_for_next_trial()? {
                    self.state = CampaignState::Sampling;
                } else {
                    warn!(
                        "Console did not return to the ready screen within {} ms, retrying reset",
                        self.config.reset_timeout_ms
                    );
                }
                Ok(true)
            }

            CampaignState::Sampling => {
                let params = self.sampler.sample()?;
                debug!(
                    "Trial {}: {} {}",
                    self.runlog.next_trial_id(),
                    TrialPhase::Sampling,
                    params
                );
                self.state = CampaignState::Running(params);
                Ok(true)
            }

            CampaignState::Running(params) => {
                let outcome = self.run_trial(params)?;
                self.stats.record(&outcome);
                self.last_outcome = Some(outcome);
                self.state = CampaignState::CheckingLoop;
                Ok(true)
            }

            CampaignState::CheckingLoop => {
                let done = self
                    .config
                    .max_trials
                    .is_some_and(|limit| self.stats.trials >= limit);
                if done {
                    info!(
                        "Campaign complete: {} trials in {:.1}s",
                        self.stats.trials,
                        self.start_time.elapsed().as_secs_f32()
                    );
                    self.state = CampaignState::Complete;
                    Ok(false)
                } else {
                    self.state = CampaignState::Preparing;
                    Ok(true)
                }
            }

            CampaignState::Complete | CampaignState::Cancelled | CampaignState::Failed(_) => {
                Ok(false)
            }
        }
    }

    fn send_replay(&self, job: ReplayJob) {
        if self.replays.send(job).is_err() {
            warn!("Replay worker is gone, frames are not being saved");
        }
    }

    /// Runs one full trial with `params` and appends its outcome to the
    /// runlog.
    ///
    /// Rejections, timeouts and unreadable results are outcomes, not
    /// errors. Cancellation before a terminal screen discards the trial and
    /// returns `CampaignError::Cancelled`.
    pub fn run_trial(&mut self, params: TrialParameters) -> Result<TrialOutcome, CampaignError> {
        let trial_id = self.runlog.next_trial_id();
        let command = Command::Run(params);
        let command_line = command.to_line().trim_end().to_string();

        for line in self.rig.link.drain()? {
            debug!("Trial {}: stale line '{}'", trial_id, line);
        }

        let cursor = self.rig.store.next_index();
        let started = Instant::now();
        self.rig.link.send(&command)?;
        info!("Trial {}: {} '{}'", trial_id, TrialPhase::Sent, command_line);

        match self.await_ack(trial_id, &params)? {
            Ack::Accepted => {}
            Ack::Refused(response) => {
                warn!(
                    "Trial {}: {}: firmware answered '{}'",
                    trial_id,
                    TrialPhase::Rejected,
                    response
                );
                return self.record_rejected(trial_id, params);
            }
            Ack::NoReply => {
                warn!(
                    "Trial {}: {}: no acknowledgment within {} ms",
                    trial_id,
                    TrialPhase::Rejected,
                    self.config.ack_timeout_ms
                );
                return self.record_rejected(trial_id, params);
            }
        }

        debug!("Trial {}: {}", trial_id, TrialPhase::AwaitingResult);
        self.send_replay(ReplayJob::Begin {
            trial_id,
            command: command_line,
        });
        let watch = self.watch_trial(trial_id, &params, cursor, started)?;

        let replay = if watch.frame_count > 0 {
            let file_name = replay_file_name(trial_id, watch.status, watch.distance, &params);
            self.send_replay(ReplayJob::Finish {
                file_name: file_name.clone(),
            });
            Some(file_name)
        } else {
            self.send_replay(ReplayJob::Discard);
            None
        };

        let outcome = TrialOutcome::new(
            trial_id,
            params,
            watch.status,
            watch.distance,
            watch.frame_count,
            replay,
        );
        match outcome.distance {
            Some(d) => info!(
                "Trial {}: {} {:.2} m ({} frames)",
                trial_id,
                watch.status.phase(),
                d,
                watch.frame_count
            ),
            None => info!(
                "Trial {}: {} as {} ({} frames)",
                trial_id,
                watch.status.phase(),
                watch.status,
                watch.frame_count
            ),
        }
        self.record(outcome)
    }

    fn record_rejected(
        &mut self,
        trial_id: u64,
        params: TrialParameters,
    ) -> Result<TrialOutcome, CampaignError> {
        self.record(TrialOutcome::new(
            trial_id,
            params,
            TrialStatus::Rejected,
            None,
            0,
            None,
        ))
    }

    fn record(&mut self, outcome: TrialOutcome) -> Result<TrialOutcome, CampaignError> {
        self.runlog.append(&outcome)?;
        Ok(outcome)
    }

    /// Waits for the firmware to echo `params` back.
    fn await_ack(&mut self, trial_id: u64, params: &TrialParameters) -> Result<Ack, CampaignError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.ack_timeout_ms);
        let poll = self.poll_interval();
        loop {
            if self.cancel.is_cancelled() {
                return Err(CampaignError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Ack::NoReply);
            }
            let Some(line) = self.rig.link.read_line(poll.min(remaining))? else {
                continue;
            };
            match self.patterns.parse(&line) {
                Response::Running(echoed) if echoed == *params => return Ok(Ack::Accepted),
                Response::Running(echoed) => warn!(
                    "Trial {}: firmware is running {}, not ours",
                    trial_id,
                    encode(&echoed)
                ),
                response if response.is_rejection() => return Ok(Ack::Refused(response)),
                _ => debug!("Trial {}: ignoring '{}' while awaiting acknowledgment", trial_id, line),
            }
        }
    }

    /// Streams the trial's frames to the replay worker until a terminal
    /// screen plus its post-run window, or until the result deadline.
    fn watch_trial(
        &mut self,
        trial_id: u64,
        params: &TrialParameters,
        mut cursor: u64,
        started: Instant,
    ) -> Result<Watch, CampaignError> {
        let max_record = Duration::from_millis(self.config.max_record_ms);
        let expected = Duration::from_millis(params.actuation_ms() + self.config.result_slack_ms);
        let result_deadline = started + expected.min(max_record);
        let record_limit = started + max_record;
        let poll = self.poll_interval();

        let mut resynced = false;
        let mut frame_count = 0u64;
        let mut last_kind = None;
        let mut terminal: Option<Terminal> = None;

        loop {
            let batch = match self.rig.store.since(cursor) {
                Ok(batch) => batch,
                Err(CaptureError::FrameExpired { requested, oldest }) if !resynced => {
                    warn!(
                        "Trial {}: frames {}..{} were evicted before they were read, resuming at {}",
                        trial_id, requested, oldest, oldest
                    );
                    resynced = true;
                    cursor = oldest;
                    continue;
                }
                Err(CaptureError::FrameExpired { requested, oldest }) => {
                    warn!(
                        "Trial {}: frames expired again ({} < {}), giving up",
                        trial_id, requested, oldest
                    );
                    break;
                }
                Err(e) => {
                    self.send_replay(ReplayJob::Discard);
                    return Err(e.into());
                }
            };
            cursor = batch.resume_index();

            for frame in batch {
                frame_count += 1;
                if terminal.is_none() {
                    terminal = self.inspect(trial_id, &frame, &mut last_kind);
                }
                self.send_replay(ReplayJob::Frame(frame));
            }

            if self.cancel.is_cancelled() {
                if terminal.is_some() {
                    info!("Trial {}: cancelled after the result, finalizing", trial_id);
                    break;
                }
                self.send_replay(ReplayJob::Discard);
                return Err(CampaignError::Cancelled);
            }

            let now = Instant::now();
            match terminal {
                Some(t) if now >= t.record_until || now >= record_limit => break,
                None if now >= result_deadline => break,
                _ => {}
            }

            // Pace on the link so firmware status lines are consumed.
            if let Some(line) = self.rig.link.read_line(poll)? {
                match self.patterns.parse(&line) {
                    Response::FinishedRun => {
                        debug!("Trial {}: firmware finished the sequence", trial_id)
                    }
                    _ => debug!("Trial {}: firmware says '{}'", trial_id, line),
                }
            }
        }

        Ok(match terminal {
            Some(t) => Watch {
                status: t.status,
                distance: t.distance,
                frame_count,
            },
            None => Watch {
                status: TrialStatus::TimedOut,
                distance: None,
                frame_count,
            },
        })
    }

    /// Classifies one trial frame, returning the terminal screen if it is one.
    fn inspect(
        &self,
        trial_id: u64,
        frame: &Frame,
        last_kind: &mut Option<ScreenKind>,
    ) -> Option<Terminal> {
        let state = self.rig.recognizer.recognize(&frame.image);
        let kind = match &state {
            Ok(s) => s.kind(),
            Err(
                RecognitionError::UnrecognizedGlyph { .. } | RecognitionError::UnreadableDistance(_),
            ) => ScreenKind::Result,
            Err(_) => ScreenKind::Unknown,
        };
        if *last_kind != Some(kind) {
            debug!("Trial {}: frame {} shows {}", trial_id, frame.index, kind);
            *last_kind = Some(kind);
        }

        let postrun = Duration::from_millis(self.config.postrun_ms);
        let (status, distance, window) = match state {
            Ok(ScreenState::Result(distance)) => (TrialStatus::Measured, Some(distance), postrun),
            Ok(ScreenState::Fault) => (
                TrialStatus::Fault,
                None,
                Duration::from_millis(self.config.postrun_fault_ms),
            ),
            Ok(_) => return None,
            Err(
                e @ (RecognitionError::UnrecognizedGlyph { .. }
                | RecognitionError::UnreadableDistance(_)),
            ) => {
                warn!(
                    "Trial {}: result screen in frame {} is unreadable: {}",
                    trial_id, frame.index, e
                );
                (TrialStatus::Unreadable, None, postrun)
            }
            Err(e) => {
                warn!("Trial {}: cannot classify frame {}: {}", trial_id, frame.index, e);
                return None;
            }
        };
        Some(Terminal {
            status,
            distance,
            record_until: Instant::now() + window,
        })
    }

    /// Returns the console to the ready screen.
    ///
    /// Presses fire whenever a result, fault or try-again screen appears,
    /// and again each `reset_refire_ms` while it stays. Returns `Ok(false)`
    /// if the ready screen did not appear within `reset_timeout_ms`.
    pub fn prepare_for_next_trial(&mut self) -> Result<bool, CampaignError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.reset_timeout_ms);
        let refire = Duration::from_millis(self.config.reset_refire_ms);
        let poll = self.poll_interval();

        let mut last_index = None;
        let mut last_kind = None;
        let mut last_fire: Option<Instant> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CampaignError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }

            let mut changed = false;
            if let Some(frame) = self.rig.store.latest()? {
                if last_index != Some(frame.index) {
                    last_index = Some(frame.index);
                    let kind = self.rig.recognizer.classify(&frame.image).unwrap_or_else(|e| {
                        warn!("Reset: cannot classify frame {}: {}", frame.index, e);
                        ScreenKind::Unknown
                    });
                    if kind == ScreenKind::Ready {
                        for line in self.rig.link.drain()? {
                            debug!("Reset: firmware says '{}'", line);
                        }
                        info!("Console is ready");
                        return Ok(true);
                    }
                    if last_kind != Some(kind) {
                        debug!("Reset: screen shows {}", kind);
                        last_kind = Some(kind);
                        changed = true;
                    }
                }
            }

            let dismissable = last_kind.filter(|kind| {
                matches!(kind, ScreenKind::Result | ScreenKind::Fault | ScreenKind::TryAgain)
            });
            let due = changed || last_fire.is_none_or(|at| at.elapsed() >= refire);
            if let Some(kind) = dismissable.filter(|_| due) {
                info!("Reset: {} on screen, pressing fire", kind);
                self.rig.link.send(&Command::Manual(ManualAction::Fire))?;
                last_fire = Some(Instant::now());
            }

            if let Some(line) = self.rig.link.read_line(poll)? {
                debug!("Reset: firmware says '{}'", line);
            }
        }
    }
}
