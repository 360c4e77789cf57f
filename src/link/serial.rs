use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, warn};

use super::{ControllerLink, LinkError};
use crate::config::SerialConfig;
use crate::protocol::Command;

/// Longest wait handed to a single port read.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Partial lines longer than this are garbage; drop them.
const MAX_PENDING: usize = 1024;

/// Serial connection to the actuation board.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialLink {
    /// Opens the port, waits for the board to come out of reset and discards
    /// its boot output.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, LinkError> {
        let port = serialport::new(path, config.baud_rate)
            .timeout(READ_SLICE)
            .open()
            .map_err(|source| LinkError::Open {
                path: path.to_string(),
                source,
            })?;
        info!("Opened {} at {} baud", path, config.baud_rate);

        let mut link = Self {
            port,
            pending: Vec::with_capacity(128),
        };

        thread::sleep(Duration::from_millis(config.settle_ms));
        for line in link.drain()? {
            debug!("Boot output: {}", line);
        }
        Ok(link)
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&raw[..end]);
        Some(text.trim_end_matches('\r').to_string())
    }
}

impl ControllerLink for SerialLink {
    fn send(&mut self, command: &Command) -> Result<(), LinkError> {
        let line = command.to_line();
        debug!("-> {}", line.trim_end());
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 64];

        loop {
            if let Some(line) = self.take_line() {
                debug!("<- {}", line);
                return Ok(Some(line));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.port.set_timeout(remaining.min(READ_SLICE))?;

            match self.port.read(&mut chunk) {
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }

            if self.pending.len() > MAX_PENDING && !self.pending.contains(&b'\n') {
                warn!(
                    "Discarding {} bytes of unterminated serial input",
                    self.pending.len()
                );
                self.pending.clear();
            }
        }
    }
}
