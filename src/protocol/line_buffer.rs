use super::{Malformation, MalformedCommand};

/// Longest accepted command line, terminator excluded.
pub const MAX_COMMAND_LEN: usize = 64;

/// Fixed-capacity byte accumulator for `\n`-terminated command lines.
///
/// Bytes past the capacity are dropped and the whole line is reported as
/// too long once its terminator arrives, so an oversized line never turns
/// into a truncated command.
pub struct LineBuffer<const N: usize = MAX_COMMAND_LEN> {
    buf: [u8; N],
    len: usize,
    overflowed: bool,
    terminated: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            overflowed: false,
            terminated: false,
        }
    }

    /// Feeds one byte.
    ///
    /// Returns `Some` when `byte` completes a line. The line has any trailing
    /// `\r` removed. Non-UTF-8 input is reported as an unknown command.
    pub fn push(&mut self, byte: u8) -> Option<Result<&str, MalformedCommand>> {
        if self.terminated {
            self.clear();
        }

        if byte == b'\n' {
            self.terminated = true;
            if self.overflowed {
                return Some(Err(Malformation::TooLong.into()));
            }
            let mut end = self.len;
            if end > 0 && self.buf[end - 1] == b'\r' {
                end -= 1;
            }
            return Some(
                std::str::from_utf8(&self.buf[..end])
                    .map_err(|_| Malformation::UnknownCommand.into()),
            );
        }

        if self.len < N {
            self.buf[self.len] = byte;
            self.len += 1;
        } else {
            self.overflowed = true;
        }
        None
    }

    /// Drops any partially assembled line.
    pub fn clear(&mut self) {
        self.len = 0;
        self.overflowed = false;
        self.terminated = false;
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0 && !self.overflowed
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
