//! Unattended trial campaign.
//!
//! This module provides:
//! - Randomized parameter sampling with the step-count coupling
//! - The per-trial orchestration state machine (send, acknowledge, watch
//!   the screen, record)
//! - The reset sequence that returns the console to the ready screen
//! - The campaign runner with its replay worker thread and statistics

pub mod runner;
pub mod sampler;
pub mod state;
pub mod stats;
pub mod trial;

pub use runner::{run_campaign, CampaignSummary};
pub use sampler::{ParameterSampler, SamplerError};
pub use state::{CampaignContext, CampaignState};
pub use stats::CampaignStats;
pub use trial::{TrialOutcome, TrialPhase, TrialStatus};

use thiserror::Error;

use crate::capture::{CaptureError, FrameStore};
use crate::link::LinkError;
use crate::persistence::PersistenceError;
use crate::recognition::Recognizer;

/// Failures that end a campaign. Everything else becomes a trial outcome.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("frame source: {0}")]
    Capture(#[from] CaptureError),
    #[error("controller link: {0}")]
    Link(#[from] LinkError),
    #[error("runlog: {0}")]
    Runlog(#[from] PersistenceError),
    #[error("sampling: {0}")]
    Sampler(#[from] SamplerError),
    #[error("response patterns: {0}")]
    Patterns(#[from] regex::Error),
    #[error("cancelled")]
    Cancelled,
}

/// The live hardware a campaign drives: controller link, frame store and
/// the recognizer for its frames.
pub struct Rig<L> {
    pub link: L,
    pub store: FrameStore,
    pub recognizer: Recognizer,
}
