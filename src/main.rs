//! Javelin Rig command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use javelin_rig::campaign::{run_campaign, CampaignState, Rig};
use javelin_rig::cancel::CancelToken;
use javelin_rig::capture::{FrameSource, FrameStore, SourceSettings, V4lCamera};
use javelin_rig::config::load_config;
use javelin_rig::link::SerialLink;
use javelin_rig::persistence::Runlog;
use javelin_rig::recognition::{Recognizer, RecognizerSettings, ReferenceSet};
use javelin_rig::{logging, paths};

#[derive(Parser, Debug)]
#[command(version, about = "Unattended throw-parameter search")]
struct Args {
    /// Serial port of the actuation board
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Capture device path or index (overrides config)
    #[arg(short = 'd', long)]
    video_device: Option<String>,

    /// Directory for runlog.csv, replays/ and logs/ [default: next to the executable]
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Config file [default: config.json next to the executable]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many trials (overrides config)
    #[arg(long)]
    trials: Option<u64>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| paths::exe_dir().clone());

    if let Err(e) = paths::ensure_directories(&out_dir) {
        eprintln!("Cannot create output directories in {}: {}", out_dir.display(), e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = logging::init(&paths::logs_dir(&out_dir)) {
        eprintln!("Cannot open log file: {}", e);
        return ExitCode::FAILURE;
    }

    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        error!("[PANIC]{} {}", location, msg);
    }));

    match run(args, out_dir) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Wires up the rig and runs the campaign. `Ok(false)` means the campaign
/// stopped on a failure.
fn run(args: Args, out_dir: PathBuf) -> Result<bool> {
    info!("Javelin Rig {} starting", env!("CARGO_PKG_VERSION"));
    info!("Output directory: {}", out_dir.display());

    let mut config = load_config(args.config.as_deref());
    if let Some(device) = args.video_device {
        config.video.device = device;
    }
    if let Some(trials) = args.trials {
        config.campaign.max_trials = Some(trials);
    }
    config.validate().context("invalid configuration")?;

    let templates = &config.recognition.templates_dir;
    let refs = ReferenceSet::load(templates, config.recognition.text_threshold)
        .with_context(|| format!("loading reference images from {}", templates.display()))?;
    let crop = config.video.crop;
    if (refs.frame_width, refs.frame_height) != (crop.width(), crop.height()) {
        bail!(
            "reference set is for {}x{} frames but the crop is {}x{}",
            refs.frame_width,
            refs.frame_height,
            crop.width(),
            crop.height()
        );
    }
    let recognizer = Recognizer::new(refs, RecognizerSettings::from(&config.recognition));

    let link = SerialLink::open(&args.port, &config.serial)
        .with_context(|| format!("opening controller on {}", args.port))?;

    let runlog_path = paths::runlog_path(&out_dir);
    let runlog = Runlog::open(&runlog_path)
        .with_context(|| format!("opening runlog {}", runlog_path.display()))?;
    info!(
        "Runlog: {} (next trial {})",
        runlog_path.display(),
        runlog.next_trial_id()
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, stopping after the current step...");
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let source_stop = CancelToken::new();
    let store = FrameStore::new(config.video.ring_capacity);
    let video = config.video.clone();
    let source = FrameSource::spawn(
        move || V4lCamera::open(&video),
        store.clone(),
        SourceSettings {
            fps: config.video.fps,
            max_decode_failures: config.video.max_decode_failures,
        },
        source_stop.clone(),
    )
    .with_context(|| format!("starting capture on {}", config.video.device))?;

    let rig = Rig {
        link,
        store,
        recognizer,
    };
    let result = run_campaign(rig, runlog, paths::replays_dir(&out_dir), &config, cancel);

    source_stop.cancel();
    source.join();

    let summary = result.context("campaign aborted")?;
    Ok(!matches!(summary.final_state, CampaignState::Failed(_)))
}
