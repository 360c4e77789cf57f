use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use super::{ControllerLink, LinkError};
use crate::firmware::{Firmware, RecordingGamepad};
use crate::protocol::{Command, Response};

/// Real-time pause when a read finds nothing to do, so polling loops driven
/// by the wall clock do not spin.
const IDLE_NAP: Duration = Duration::from_millis(2);

type Listener = Box<dyn FnMut(&Response, u64)>;

/// Controller link backed by the firmware state machine on a virtual clock.
///
/// Virtual time only moves inside [`ControllerLink::read_line`] (by at most
/// the requested timeout) and when a command is sent while a sequence is
/// still playing, in which case the clock jumps to its end first. A listener
/// sees every response with the virtual time it was emitted at, which lets
/// tests script what the "console" shows in reaction.
pub struct SimulatedController {
    firmware: Firmware<RecordingGamepad>,
    clock_ms: u64,
    outbox: VecDeque<String>,
    sent: Vec<String>,
    listener: Option<Listener>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self {
            firmware: Firmware::new(RecordingGamepad::new()),
            clock_ms: 0,
            outbox: VecDeque::new(),
            sent: Vec::new(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl FnMut(&Response, u64) + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Every line sent so far, terminators stripped.
    pub fn sent_lines(&self) -> &[String] {
        &self.sent
    }

    pub fn firmware(&self) -> &Firmware<RecordingGamepad> {
        &self.firmware
    }

    /// Feeds bytes to the firmware as if they came over the wire.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.settle();
        for &byte in bytes {
            if let Some(response) = self.firmware.on_byte(byte, self.clock_ms) {
                self.emit(response);
            }
        }
    }

    fn emit(&mut self, response: Response) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&response, self.clock_ms);
        }
        self.outbox.push_back(response.to_string());
    }

    /// Moves the clock towards `until`, stopping early once a response is
    /// queued.
    fn advance_to(&mut self, until: u64) {
        while self.outbox.is_empty() {
            match self.firmware.machine().deadline_ms() {
                Some(deadline) if deadline <= until => {
                    self.clock_ms = self.clock_ms.max(deadline);
                    if let Some(response) = self.firmware.poll(self.clock_ms) {
                        self.emit(response);
                    }
                }
                _ => {
                    self.clock_ms = self.clock_ms.max(until);
                    return;
                }
            }
        }
    }

    fn settle(&mut self) {
        while let Some(deadline) = self.firmware.machine().deadline_ms() {
            self.clock_ms = self.clock_ms.max(deadline);
            if let Some(response) = self.firmware.poll(self.clock_ms) {
                self.emit(response);
            }
        }
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerLink for SimulatedController {
    fn send(&mut self, command: &Command) -> Result<(), LinkError> {
        let line = command.to_line();
        self.sent.push(line.trim_end().to_string());
        self.send_raw(line.as_bytes());
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        if self.outbox.is_empty() {
            let until = self.clock_ms + timeout.as_millis() as u64;
            self.advance_to(until);
        }
        let line = self.outbox.pop_front();
        if line.is_none() && !timeout.is_zero() {
            thread::sleep(timeout.min(IDLE_NAP));
        }
        Ok(line)
    }

    fn drain(&mut self) -> Result<Vec<String>, LinkError> {
        Ok(self.outbox.drain(..).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ManualAction, TrialParameters};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_run_round_trip() {
        let params = TrialParameters::new(None, 500, 30, 55, 55, 0, 400).unwrap();
        let mut link = SimulatedController::new();
        link.send(&Command::Run(params)).unwrap();

        assert_eq!(
            link.read_line(Duration::from_millis(10)).unwrap().as_deref(),
            Some("Running -1,500,30,55,55,0,400")
        );
        assert_eq!(link.read_line(Duration::from_millis(1_000)).unwrap(), None);

        let mut finished = None;
        for _ in 0..10 {
            if let Some(line) = link.read_line(Duration::from_millis(1_000)).unwrap() {
                finished = Some(line);
                break;
            }
        }
        assert_eq!(finished.as_deref(), Some("Finished run"));
        assert_eq!(link.clock_ms(), 4_145);
        assert_eq!(link.sent_lines(), ["r -1,500,30,55,55,0,400"]);
    }

    #[test]
    fn test_listener_sees_responses_with_time() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut link = SimulatedController::new()
            .with_listener(move |response, at| sink.borrow_mut().push((response.clone(), at)));

        link.send(&Command::Manual(ManualAction::Fire)).unwrap();
        link.send(&Command::Manual(ManualAction::Fire)).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Response::Manual(ManualAction::Fire), 0));
        // The second fire waits for the first hold to end.
        assert_eq!(seen[1], (Response::Manual(ManualAction::Fire), 100));
    }

    #[test]
    fn test_rejection_reported() {
        let mut link = SimulatedController::new();
        link.send_raw(b"r 1,2,3\n");
        assert_eq!(
            link.read_line(Duration::ZERO).unwrap().as_deref(),
            Some("Expected 7 parameters, got 3")
        );
        assert!(!link.firmware().is_busy());
    }
}
