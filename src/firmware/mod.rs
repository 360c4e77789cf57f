//! Microcontroller side of the actuation link.
//!
//! `Firmware` owns the command line buffer and the actuation machine. It is
//! driven by two calls from the board's main loop (or from the simulated
//! controller on the host): `on_byte` for every received byte and `poll` with
//! the current millisecond clock.

pub mod gamepad;
pub mod machine;

pub use gamepad::{Gamepad, GamepadEvent, RecordingGamepad, Stick};
pub use machine::{ActuationMachine, ActuationSession, Busy, Completion, Phase, MANUAL_HOLD_MS};

use crate::protocol::{Command, LineBuffer, Response};

pub struct Firmware<G: Gamepad> {
    machine: ActuationMachine<G>,
    line: LineBuffer,
}

impl<G: Gamepad> Firmware<G> {
    pub fn new(gamepad: G) -> Self {
        Self {
            machine: ActuationMachine::new(gamepad),
            line: LineBuffer::new(),
        }
    }

    pub fn machine(&self) -> &ActuationMachine<G> {
        &self.machine
    }

    pub fn is_busy(&self) -> bool {
        self.machine.is_busy()
    }

    /// Handles one received byte.
    ///
    /// Bytes arriving while a sequence runs are dropped, not buffered. A
    /// completed line yields exactly one response: the acknowledgment of the
    /// started sequence or the reason the line was refused.
    pub fn on_byte(&mut self, byte: u8, now_ms: u64) -> Option<Response> {
        if self.machine.is_busy() {
            return None;
        }

        let parsed = match self.line.push(byte)? {
            Ok(text) => Command::parse(text),
            Err(err) => Err(err),
        };

        let started = match parsed {
            Ok(Command::Run(params)) => self
                .machine
                .start_run(params, now_ms)
                .map(|_| Response::Running(params)),
            Ok(Command::Manual(action)) => self
                .machine
                .start_manual(action, now_ms)
                .map(|_| Response::Manual(action)),
            Err(err) => return Some(Response::from(err)),
        };
        // The busy check above makes `Busy` unreachable here.
        started.ok()
    }

    /// Advances the machine to `now_ms`.
    ///
    /// Returns `Finished run` when a run completes. Manual primitives finish
    /// silently.
    pub fn poll(&mut self, now_ms: u64) -> Option<Response> {
        match self.machine.poll(now_ms)? {
            Completion::Run => {
                self.line.clear();
                Some(Response::FinishedRun)
            }
            Completion::Manual(_) => {
                self.line.clear();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ManualAction, TrialParameters};

    fn feed(fw: &mut Firmware<RecordingGamepad>, input: &str, now_ms: u64) -> Vec<Response> {
        input
            .bytes()
            .filter_map(|b| fw.on_byte(b, now_ms))
            .collect()
    }

    #[test]
    fn test_run_acknowledged_then_finished() {
        let mut fw = Firmware::new(RecordingGamepad::new());
        let responses = feed(&mut fw, "r -1,500,30,55,55,0,400\n", 0);
        let params = TrialParameters::new(None, 500, 30, 55, 55, 0, 400).unwrap();
        assert_eq!(responses, vec![Response::Running(params)]);
        assert!(fw.is_busy());

        assert_eq!(fw.poll(4_000), None);
        assert_eq!(fw.poll(4_145), Some(Response::FinishedRun));
        assert!(!fw.is_busy());
    }

    #[test]
    fn test_input_ignored_while_busy() {
        let mut fw = Firmware::new(RecordingGamepad::new());
        feed(&mut fw, "r -1,0,1,10,0,0,10\n", 0);
        assert!(feed(&mut fw, "f\nr -1,0,1,10,0,0,10\n", 5).is_empty());
        assert_eq!(fw.poll(20), Some(Response::FinishedRun));

        // Nothing from the busy period leaked into the buffer.
        assert_eq!(
            feed(&mut fw, "f\n", 30),
            vec![Response::Manual(ManualAction::Fire)]
        );
    }

    #[test]
    fn test_malformed_command_does_not_actuate() {
        let mut fw = Firmware::new(RecordingGamepad::new());
        assert_eq!(
            feed(&mut fw, "r 1,2,3\n", 0),
            vec![Response::ParameterCount { expected: 7, got: 3 }]
        );
        assert_eq!(
            feed(&mut fw, "r -1,500,x,55,55,0,400\n", 0),
            vec![Response::InvalidParameter { field: 3 }]
        );
        assert_eq!(feed(&mut fw, "jump\n", 0), vec![Response::UnknownCommand]);
        assert!(!fw.is_busy());
        assert!(fw.machine().gamepad().events().is_empty());
    }

    #[test]
    fn test_overlong_line_rejected() {
        let mut fw = Firmware::new(RecordingGamepad::new());
        let line = format!("r {}\n", "1,".repeat(40));
        assert_eq!(feed(&mut fw, &line, 0), vec![Response::CommandTooLong]);
        assert!(!fw.is_busy());
    }

    #[test]
    fn test_manual_fire_is_silent_on_completion() {
        let mut fw = Firmware::new(RecordingGamepad::new());
        assert_eq!(
            feed(&mut fw, "f\r\n", 0),
            vec![Response::Manual(ManualAction::Fire)]
        );
        assert!(fw.machine().gamepad().is_pressed());
        assert_eq!(fw.poll(MANUAL_HOLD_MS), None);
        assert!(!fw.is_busy());
        assert!(!fw.machine().gamepad().is_pressed());
    }
}
