//! Timed actuation sequence as an explicit, non-blocking state machine.
//!
//! The machine never sleeps. The caller feeds it a millisecond clock through
//! [`ActuationMachine::poll`] and it moves through as many phases as have
//! elapsed, setting controller outputs at each phase's scheduled start.

use std::fmt;

use super::gamepad::{Gamepad, Stick};
use crate::protocol::{Direction, ManualAction, TrialParameters};

/// How long manual primitives hold the button or stick.
pub const MANUAL_HOLD_MS: u64 = 100;

/// Stick deflection used for the throw.
pub const THROW_STICK: Stick = Stick::Left;

/// Actuation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No sequence running; commands are accepted
    Idle,
    /// Optional press before the run-up
    InitialFire,
    /// Released wait before the first step
    InitialSkip,
    /// Button held for one run-up step
    StepPress,
    /// Button released between steps
    StepRelease,
    /// Last step press, followed by no release gap
    FinalStepPress,
    /// Released wait before the throw
    PreThrowSkip,
    /// Stick fully deflected
    Throw,
    /// Single manual primitive
    Manual(ManualAction),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::InitialFire => write!(f, "Initial fire"),
            Phase::InitialSkip => write!(f, "Initial skip"),
            Phase::StepPress => write!(f, "Step press"),
            Phase::StepRelease => write!(f, "Step release"),
            Phase::FinalStepPress => write!(f, "Final step press"),
            Phase::PreThrowSkip => write!(f, "Pre-throw skip"),
            Phase::Throw => write!(f, "Throw"),
            Phase::Manual(action) => write!(f, "Manual {:?}", action),
        }
    }
}

/// State of the run currently being played. Dropped when the run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationSession {
    pub params: TrialParameters,
    /// Zero-based index of the current (or next) step
    pub step: u32,
}

/// What just finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Run,
    Manual(ManualAction),
}

/// Error returned when a sequence is started while another is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("actuation already in progress ({0})")]
pub struct Busy(pub Phase);

pub struct ActuationMachine<G: Gamepad> {
    gamepad: G,
    phase: Phase,
    deadline_ms: u64,
    session: Option<ActuationSession>,
}

impl<G: Gamepad> ActuationMachine<G> {
    pub fn new(gamepad: G) -> Self {
        Self {
            gamepad,
            phase: Phase::Idle,
            deadline_ms: 0,
            session: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&ActuationSession> {
        self.session.as_ref()
    }

    pub fn gamepad(&self) -> &G {
        &self.gamepad
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Scheduled end of the current phase, if one is active.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.is_busy().then_some(self.deadline_ms)
    }

    /// Starts a full run at `now_ms`.
    pub fn start_run(&mut self, params: TrialParameters, now_ms: u64) -> Result<(), Busy> {
        if self.is_busy() {
            return Err(Busy(self.phase));
        }
        self.session = Some(ActuationSession { params, step: 0 });
        let first = if params.initial_fire_ms().is_some() {
            Phase::InitialFire
        } else {
            Phase::InitialSkip
        };
        self.enter(first, now_ms);
        Ok(())
    }

    /// Starts a manual nudge or fire at `now_ms`.
    pub fn start_manual(&mut self, action: ManualAction, now_ms: u64) -> Result<(), Busy> {
        if self.is_busy() {
            return Err(Busy(self.phase));
        }
        self.enter(Phase::Manual(action), now_ms);
        Ok(())
    }

    /// Advances through every phase whose deadline is at or before `now_ms`.
    ///
    /// Returns the completion if the sequence ended during this call.
    pub fn poll(&mut self, now_ms: u64) -> Option<Completion> {
        while self.is_busy() && now_ms >= self.deadline_ms {
            let at = self.deadline_ms;
            let finished = self.phase;
            let next = self.successor();
            if next == Phase::Idle {
                self.release(at);
                return Some(match finished {
                    Phase::Manual(action) => Completion::Manual(action),
                    _ => Completion::Run,
                });
            }
            self.enter(next, at);
        }
        None
    }

    fn successor(&mut self) -> Phase {
        let Some(session) = self.session.as_mut() else {
            return Phase::Idle;
        };
        let steps = session.params.num_steps();
        match self.phase {
            Phase::InitialFire => Phase::InitialSkip,
            Phase::InitialSkip if steps > 1 => Phase::StepPress,
            Phase::InitialSkip => Phase::FinalStepPress,
            Phase::StepPress => Phase::StepRelease,
            Phase::StepRelease => {
                session.step += 1;
                if session.step + 1 < steps {
                    Phase::StepPress
                } else {
                    Phase::FinalStepPress
                }
            }
            Phase::FinalStepPress => Phase::PreThrowSkip,
            Phase::PreThrowSkip => Phase::Throw,
            Phase::Throw | Phase::Manual(_) | Phase::Idle => Phase::Idle,
        }
    }

    fn enter(&mut self, phase: Phase, at: u64) {
        let duration = match (phase, self.session) {
            (Phase::Manual(ManualAction::Fire), _) => {
                self.gamepad.set_button(true, at);
                MANUAL_HOLD_MS
            }
            (Phase::Manual(ManualAction::Nudge(dir)), _) => {
                self.gamepad.set_stick(stick_for(dir), at);
                MANUAL_HOLD_MS
            }
            (Phase::InitialFire, Some(s)) => {
                self.gamepad.set_button(true, at);
                u64::from(s.params.initial_fire_ms().unwrap_or(0))
            }
            (Phase::InitialSkip, Some(s)) => {
                self.gamepad.set_button(false, at);
                u64::from(s.params.initial_skip_ms())
            }
            (Phase::StepPress | Phase::FinalStepPress, Some(s)) => {
                self.gamepad.set_button(true, at);
                u64::from(s.params.step_fire_ms())
            }
            (Phase::StepRelease, Some(s)) => {
                self.gamepad.set_button(false, at);
                u64::from(s.params.step_skip_ms())
            }
            (Phase::PreThrowSkip, Some(s)) => {
                self.gamepad.set_button(false, at);
                u64::from(s.params.pre_throw_skip_ms())
            }
            (Phase::Throw, Some(s)) => {
                self.gamepad.set_stick(THROW_STICK, at);
                u64::from(s.params.throw_ms())
            }
            _ => {
                self.release(at);
                return;
            }
        };
        self.phase = phase;
        self.deadline_ms = at + duration;
    }

    /// Returns every output to rest and ends the session.
    fn release(&mut self, at: u64) {
        self.gamepad.set_button(false, at);
        self.gamepad.set_stick(Stick::Neutral, at);
        self.phase = Phase::Idle;
        self.session = None;
    }
}

fn stick_for(dir: Direction) -> Stick {
    match dir {
        Direction::Up => Stick::Up,
        Direction::Down => Stick::Down,
        Direction::Left => Stick::Left,
        Direction::Right => Stick::Right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::gamepad::{GamepadEvent, RecordingGamepad};

    fn machine() -> ActuationMachine<RecordingGamepad> {
        ActuationMachine::new(RecordingGamepad::new())
    }

    #[test]
    fn test_reference_run_timing() {
        let params = TrialParameters::new(None, 500, 30, 55, 55, 0, 400).unwrap();
        let mut m = machine();
        m.start_run(params, 1_000).unwrap();
        assert_eq!(m.phase(), Phase::InitialSkip);

        assert_eq!(m.poll(1_000 + 4_144), None);
        assert!(m.is_busy());
        assert_eq!(m.gamepad().stick(), Stick::Left);

        assert_eq!(m.poll(1_000 + 4_145), Some(Completion::Run));
        assert!(!m.is_busy());
        assert!(m.session().is_none());
        assert!(!m.gamepad().is_pressed());
        assert_eq!(m.gamepad().stick(), Stick::Neutral);

        let presses = m.gamepad().press_times();
        assert_eq!(presses.len(), 30);
        assert_eq!(presses[0], 1_500);
        assert_eq!(presses[1], 1_610);
        assert_eq!(presses[29], 1_500 + 29 * 110);
    }

    #[test]
    fn test_final_step_has_no_release_gap() {
        let params = TrialParameters::new(None, 0, 2, 10, 50, 20, 30).unwrap();
        let mut m = machine();
        m.start_run(params, 0).unwrap();
        m.poll(200);
        let events = m.gamepad().events().to_vec();
        assert_eq!(
            events,
            vec![
                GamepadEvent::Button { pressed: true, at_ms: 0 },
                GamepadEvent::Button { pressed: false, at_ms: 10 },
                GamepadEvent::Button { pressed: true, at_ms: 60 },
                GamepadEvent::Button { pressed: false, at_ms: 70 },
                GamepadEvent::Stick { stick: Stick::Left, at_ms: 90 },
                GamepadEvent::Stick { stick: Stick::Neutral, at_ms: 120 },
            ]
        );
    }

    #[test]
    fn test_initial_fire_pressed_first() {
        let params = TrialParameters::new(Some(40), 100, 1, 10, 0, 0, 10).unwrap();
        let mut m = machine();
        m.start_run(params, 0).unwrap();
        assert_eq!(m.phase(), Phase::InitialFire);
        assert!(m.gamepad().is_pressed());
        m.poll(40);
        assert_eq!(m.phase(), Phase::InitialSkip);
        assert!(!m.gamepad().is_pressed());
        assert_eq!(m.poll(160), Some(Completion::Run));
        assert_eq!(m.gamepad().press_times(), vec![0, 140]);
    }

    #[test]
    fn test_step_index_tracks_progress() {
        let params = TrialParameters::new(None, 0, 5, 10, 10, 0, 10).unwrap();
        let mut m = machine();
        m.start_run(params, 0).unwrap();
        m.poll(45);
        assert_eq!(m.phase(), Phase::StepPress);
        assert_eq!(m.session().unwrap().step, 2);
    }

    #[test]
    fn test_rejects_second_sequence_while_busy() {
        let params = TrialParameters::new(None, 100, 3, 10, 10, 0, 10).unwrap();
        let mut m = machine();
        m.start_run(params, 0).unwrap();
        assert_eq!(
            m.start_run(params, 5),
            Err(Busy(Phase::InitialSkip))
        );
        assert!(m.start_manual(ManualAction::Fire, 5).is_err());
    }

    #[test]
    fn test_manual_nudge_holds_then_releases() {
        let mut m = machine();
        m.start_manual(ManualAction::Nudge(Direction::Up), 10).unwrap();
        assert_eq!(m.gamepad().stick(), Stick::Up);
        assert_eq!(m.poll(109), None);
        assert_eq!(
            m.poll(110),
            Some(Completion::Manual(ManualAction::Nudge(Direction::Up)))
        );
        assert_eq!(m.gamepad().stick(), Stick::Neutral);
    }
}
