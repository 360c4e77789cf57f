//! Campaign runner - entry point for the unattended loop.
//!
//! Spawns the replay worker, drives the state machine until it stops, and
//! shuts the worker down so in-flight replays are flushed.

use std::path::PathBuf;
use std::thread;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};

use super::sampler::ParameterSampler;
use super::state::{CampaignContext, CampaignState};
use super::stats::CampaignStats;
use super::{CampaignError, Rig};
use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::link::ControllerLink;
use crate::persistence::{create_replay_queue, run_replay_worker, Runlog};

/// How a campaign ended.
#[derive(Debug, Clone)]
pub struct CampaignSummary {
    pub final_state: CampaignState,
    pub stats: CampaignStats,
}

/// Runs trials until the configured limit, cancellation or a fatal error.
///
/// Blocks the calling thread. Every finished trial is already in the runlog
/// when this returns; replays are flushed before it returns.
pub fn run_campaign<L: ControllerLink>(
    rig: Rig<L>,
    runlog: Runlog,
    replays_dir: PathBuf,
    config: &AppConfig,
    cancel: CancelToken,
) -> Result<CampaignSummary, CampaignError> {
    let rng = match config.sampling.seed {
        Some(seed) => {
            info!("Sampling with fixed seed {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };
    let sampler = ParameterSampler::new(&config.sampling, rng)?;

    let (sender, receiver) = create_replay_queue();
    let mut ctx = CampaignContext::new(
        rig,
        sampler,
        runlog,
        sender,
        config.campaign.clone(),
        cancel,
    )?;

    info!("Replays: {}", replays_dir.display());
    let quality = config.campaign.replay_jpeg_quality;
    let worker = thread::spawn(move || run_replay_worker(receiver, replays_dir, quality));

    let stats_every = config.campaign.stats_every.max(1);
    let result = loop {
        let before = ctx.stats.trials;
        match ctx.step() {
            Ok(true) => {
                if ctx.stats.trials > before && ctx.stats.trials % stats_every == 0 {
                    info!("{}", ctx.stats);
                }
            }
            Ok(false) => break Ok(()),
            Err(e) => {
                error!("Campaign failed: {}", e);
                break Err(e);
            }
        }
    };

    match &ctx.state {
        CampaignState::Complete => info!("Campaign completed"),
        CampaignState::Cancelled => info!("Campaign cancelled after {} trials", ctx.stats.trials),
        CampaignState::Failed(msg) => error!("Campaign stopped: {}", msg),
        other => info!("Campaign stopped in state {}", other),
    }
    info!("{}", ctx.stats);

    let summary = CampaignSummary {
        final_state: ctx.state.clone(),
        stats: ctx.stats.clone(),
    };

    // Dropping the context closes the replay channel.
    drop(ctx);
    info!("Waiting for replay worker to finish...");
    if let Err(e) = worker.join() {
        error!("Replay worker thread panicked: {:?}", e);
    }

    result.map(|()| summary)
}
