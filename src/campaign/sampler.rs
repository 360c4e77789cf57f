//! Randomized parameter sampling.
//!
//! `num_steps`, `initial_skip_ms` and `throw_ms` are drawn uniformly from
//! their ranges. `step_fire_ms` is drawn from the range of the coupling
//! breakpoint with the greatest step count not above the sampled
//! `num_steps`, so faster cadences are only tried with more steps.

use rand::Rng;
use thiserror::Error;

use crate::config::{CouplingBreakpoint, RangeConfig, SamplingConfig, StepSkip};
use crate::protocol::{MalformedCommand, TrialParameters, MAX_FIELD_VALUE};

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("{field}: empty range {min}..={max}")]
    EmptyRange {
        field: &'static str,
        min: u32,
        max: u32,
    },
    #[error("{field}: {value} is outside the protocol range")]
    Unrepresentable { field: &'static str, value: u32 },
    #[error("no step-fire range covers {steps} steps")]
    Uncovered { steps: u32 },
    #[error("sampled parameters rejected: {0}")]
    Malformed(#[from] MalformedCommand),
}

pub struct ParameterSampler<R> {
    rng: R,
    initial_fire_ms: Option<u32>,
    initial_skip_ms: RangeConfig,
    num_steps: RangeConfig,
    step_skip: StepSkip,
    pre_throw_skip_ms: u32,
    throw_ms: RangeConfig,
    /// Sorted by step count
    coupling: Vec<CouplingBreakpoint>,
}

fn check_range(field: &'static str, range: RangeConfig, lowest: u32) -> Result<(), SamplerError> {
    if range.min > range.max {
        return Err(SamplerError::EmptyRange {
            field,
            min: range.min,
            max: range.max,
        });
    }
    check_value(field, range.min, lowest)?;
    check_value(field, range.max, lowest)
}

fn check_value(field: &'static str, value: u32, lowest: u32) -> Result<(), SamplerError> {
    if value < lowest || value > MAX_FIELD_VALUE {
        return Err(SamplerError::Unrepresentable { field, value });
    }
    Ok(())
}

impl<R: Rng> ParameterSampler<R> {
    /// Validates `config` and builds a sampler drawing from `rng`.
    ///
    /// Every step count in `num_steps` must be covered by a coupling
    /// breakpoint, and every range must be non-empty and fit the protocol.
    pub fn new(config: &SamplingConfig, rng: R) -> Result<Self, SamplerError> {
        if let Some(fire) = config.initial_fire_ms {
            check_value("initial_fire_ms", fire, 0)?;
        }
        check_range("initial_skip_ms", config.initial_skip_ms, 0)?;
        check_range("num_steps", config.num_steps, 1)?;
        check_value("pre_throw_skip_ms", config.pre_throw_skip_ms, 0)?;
        check_range("throw_ms", config.throw_ms, 1)?;
        if let StepSkip::Fixed(skip) = config.step_skip {
            check_value("step_skip_ms", skip, 0)?;
        }

        let mut coupling = config.step_fire_coupling.clone();
        coupling.sort_by_key(|b| b.steps);
        for b in &coupling {
            check_range("step_fire_ms", RangeConfig::new(b.min, b.max), 1)?;
        }
        match coupling.first() {
            Some(first) if first.steps <= config.num_steps.min => {}
            _ => {
                return Err(SamplerError::Uncovered {
                    steps: config.num_steps.min,
                })
            }
        }

        Ok(Self {
            rng,
            initial_fire_ms: config.initial_fire_ms,
            initial_skip_ms: config.initial_skip_ms,
            num_steps: config.num_steps,
            step_skip: config.step_skip,
            pre_throw_skip_ms: config.pre_throw_skip_ms,
            throw_ms: config.throw_ms,
            coupling,
        })
    }

    /// Allowed `step_fire_ms` range for a step count.
    pub fn step_fire_range(&self, steps: u32) -> Option<RangeConfig> {
        self.coupling
            .iter()
            .rev()
            .find(|b| b.steps <= steps)
            .map(|b| RangeConfig::new(b.min, b.max))
    }

    fn uniform(&mut self, range: RangeConfig) -> u32 {
        self.rng.gen_range(range.min..=range.max)
    }

    /// Draws one parameter set.
    pub fn sample(&mut self) -> Result<TrialParameters, SamplerError> {
        let num_steps = self.uniform(self.num_steps);
        let fire_range = self
            .step_fire_range(num_steps)
            .ok_or(SamplerError::Uncovered { steps: num_steps })?;
        let step_fire_ms = self.uniform(fire_range);
        let step_skip_ms = match self.step_skip {
            StepSkip::Mirror => step_fire_ms,
            StepSkip::Fixed(skip) => skip,
        };
        let initial_skip_ms = self.uniform(self.initial_skip_ms);
        let throw_ms = self.uniform(self.throw_ms);

        Ok(TrialParameters::new(
            self.initial_fire_ms,
            initial_skip_ms,
            num_steps,
            step_fire_ms,
            step_skip_ms,
            self.pre_throw_skip_ms,
            throw_ms,
        )?)
    }
}
