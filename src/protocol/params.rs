//! Timing parameters for one actuation sequence.

use std::fmt;

use serde::Serialize;

use super::{Malformation, MalformedCommand};

/// Largest value any field may hold.
///
/// The firmware keeps every field in a signed 16-bit integer.
pub const MAX_FIELD_VALUE: u32 = 32_767;

/// Number of comma-separated fields in a run command.
pub const FIELD_COUNT: usize = 7;

/// The seven timing fields of one run, in wire order.
///
/// Construct through [`TrialParameters::new`], which enforces the protocol's
/// representable range. The value is immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialParameters {
    initial_fire_ms: Option<u32>,
    initial_skip_ms: u32,
    num_steps: u32,
    step_fire_ms: u32,
    step_skip_ms: u32,
    pre_throw_skip_ms: u32,
    throw_ms: u32,
}

impl TrialParameters {
    /// Validates and builds a parameter set.
    ///
    /// `initial_fire_ms = None` is sent as `-1` and skips the initial press.
    /// `num_steps`, `step_fire_ms` and `throw_ms` must be positive.
    pub fn new(
        initial_fire_ms: Option<u32>,
        initial_skip_ms: u32,
        num_steps: u32,
        step_fire_ms: u32,
        step_skip_ms: u32,
        pre_throw_skip_ms: u32,
        throw_ms: u32,
    ) -> Result<Self, MalformedCommand> {
        if let Some(fire) = initial_fire_ms {
            check_range(1, fire, 0)?;
        }
        check_range(2, initial_skip_ms, 0)?;
        check_range(3, num_steps, 1)?;
        check_range(4, step_fire_ms, 1)?;
        check_range(5, step_skip_ms, 0)?;
        check_range(6, pre_throw_skip_ms, 0)?;
        check_range(7, throw_ms, 1)?;

        Ok(Self {
            initial_fire_ms,
            initial_skip_ms,
            num_steps,
            step_fire_ms,
            step_skip_ms,
            pre_throw_skip_ms,
            throw_ms,
        })
    }

    pub fn initial_fire_ms(&self) -> Option<u32> {
        self.initial_fire_ms
    }

    pub fn initial_skip_ms(&self) -> u32 {
        self.initial_skip_ms
    }

    pub fn num_steps(&self) -> u32 {
        self.num_steps
    }

    pub fn step_fire_ms(&self) -> u32 {
        self.step_fire_ms
    }

    pub fn step_skip_ms(&self) -> u32 {
        self.step_skip_ms
    }

    pub fn pre_throw_skip_ms(&self) -> u32 {
        self.pre_throw_skip_ms
    }

    pub fn throw_ms(&self) -> u32 {
        self.throw_ms
    }

    /// Total time the firmware needs to play the sequence, in milliseconds.
    ///
    /// There is no skip after the final step.
    pub fn actuation_ms(&self) -> u64 {
        let steps = u64::from(self.num_steps);
        u64::from(self.initial_fire_ms.unwrap_or(0))
            + u64::from(self.initial_skip_ms)
            + steps * u64::from(self.step_fire_ms)
            + (steps - 1) * u64::from(self.step_skip_ms)
            + u64::from(self.pre_throw_skip_ms)
            + u64::from(self.throw_ms)
    }
}

fn check_range(field: usize, value: u32, min: u32) -> Result<(), MalformedCommand> {
    if value < min || value > MAX_FIELD_VALUE {
        return Err(Malformation::OutOfRange {
            field,
            value: i64::from(value),
        }
        .into());
    }
    Ok(())
}

impl fmt::Display for TrialParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.initial_fire_ms {
            Some(fire) => write!(f, "fi={}", fire)?,
            None => write!(f, "fi=-")?,
        }
        write!(
            f,
            " si={} steps={} fr={} sr={} st={} lt={}",
            self.initial_skip_ms,
            self.num_steps,
            self.step_fire_ms,
            self.step_skip_ms,
            self.pre_throw_skip_ms,
            self.throw_ms
        )
    }
}
