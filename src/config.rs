//! Runtime configuration.
//!
//! Loaded once at startup from `config.json`. Every section has defaults, so a
//! partial file (or none at all) is valid. The resolved value is passed down
//! explicitly; nothing reads configuration from global state.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Serial link to the actuation board.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Wait after opening the port; the board resets when the port opens
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 19_200,
            settle_ms: 2_000,
        }
    }
}

/// Pixel rectangle, edges inclusive-exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Capture device and frame ring settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Device path (`/dev/video0`) or bare index (`0`)
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Console's active picture inside the captured frame
    pub crop: CropRect,
    /// Frames retained for readers
    pub ring_capacity: usize,
    /// Consecutive undecodable frames before the source gives up
    pub max_decode_failures: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
            fps: 20,
            crop: CropRect {
                left: 182,
                top: 60,
                right: 1092,
                bottom: 660,
            },
            ring_capacity: 200,
            max_decode_failures: 50,
        }
    }
}

/// Screen-state recognizer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Directory holding `manifest.json` and the reference images
    pub templates_dir: PathBuf,
    /// Normalized cross-correlation needed for a signature to match (0.0-1.0)
    pub similarity_threshold: f32,
    /// Pixels of slack searched around each signature position
    pub search_margin: u32,
    /// Largest fraction of differing pixels accepted for a glyph match
    pub glyph_tolerance: f32,
    /// Text pixels have R, G and B all above this value
    pub text_threshold: u8,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            similarity_threshold: 0.95,
            search_margin: 2,
            glyph_tolerance: 0.15,
            text_threshold: 160,
        }
    }
}

/// Inclusive integer range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub min: u32,
    pub max: u32,
}

impl RangeConfig {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// How the release between steps is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSkip {
    /// Same length as the sampled press
    Mirror,
    Fixed(u32),
}

/// `step_fire_ms` bounds that apply from `steps` up to the next breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingBreakpoint {
    pub steps: u32,
    pub min: u32,
    pub max: u32,
}

/// Ranges the campaign samples trial parameters from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// `None` skips the initial press
    pub initial_fire_ms: Option<u32>,
    pub initial_skip_ms: RangeConfig,
    pub num_steps: RangeConfig,
    pub step_skip: StepSkip,
    pub pre_throw_skip_ms: u32,
    pub throw_ms: RangeConfig,
    /// Sorted by `steps`; the greatest breakpoint not above the sampled step
    /// count applies
    pub step_fire_coupling: Vec<CouplingBreakpoint>,
    /// Fixed RNG seed for reproducible campaigns
    pub seed: Option<u64>,
}

const DEFAULT_COUPLING: [(u32, u32, u32); 37] = [
    (20, 40, 80),
    (23, 35, 80),
    (25, 30, 80),
    (26, 30, 75),
    (27, 30, 70),
    (29, 30, 65),
    (30, 25, 60),
    (31, 25, 58),
    (32, 25, 56),
    (33, 25, 54),
    (34, 25, 52),
    (35, 20, 50),
    (36, 20, 48),
    (37, 20, 46),
    (38, 20, 44),
    (39, 20, 42),
    (40, 15, 40),
    (41, 15, 39),
    (42, 15, 38),
    (43, 15, 37),
    (44, 15, 36),
    (45, 15, 35),
    (46, 15, 34),
    (47, 15, 33),
    (48, 15, 32),
    (49, 15, 31),
    (50, 10, 30),
    (51, 10, 29),
    (53, 10, 28),
    (55, 10, 27),
    (57, 10, 26),
    (59, 10, 25),
    (61, 10, 24),
    (62, 10, 23),
    (64, 10, 22),
    (66, 10, 21),
    (68, 10, 20),
];

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            initial_fire_ms: None,
            initial_skip_ms: RangeConfig::new(100, 1_150),
            num_steps: RangeConfig::new(20, 90),
            step_skip: StepSkip::Mirror,
            pre_throw_skip_ms: 0,
            throw_ms: RangeConfig::new(300, 500),
            step_fire_coupling: DEFAULT_COUPLING
                .iter()
                .map(|&(steps, min, max)| CouplingBreakpoint { steps, min, max })
                .collect(),
            seed: None,
        }
    }
}

/// Orchestrator timing and limits. All durations in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Stop after this many trials; `None` runs until cancelled
    pub max_trials: Option<u64>,
    /// Wait for the `Running` echo after sending a run
    pub ack_timeout_ms: u64,
    /// Added to the sequence length when waiting for the result screen
    pub result_slack_ms: u64,
    /// Hard cap on one trial's recording
    pub max_record_ms: u64,
    pub poll_interval_ms: u64,
    /// Frames kept recording after a distance is shown
    pub postrun_ms: u64,
    /// Frames kept recording after a fault is shown
    pub postrun_fault_ms: u64,
    pub reset_timeout_ms: u64,
    /// Fire again when a post-run screen has not changed for this long
    pub reset_refire_ms: u64,
    /// Log a summary every N trials
    pub stats_every: u64,
    /// JPEG quality of replay frames (1-100)
    pub replay_jpeg_quality: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            max_trials: None,
            ack_timeout_ms: 2_000,
            result_slack_ms: 20_000,
            max_record_ms: 60_000,
            poll_interval_ms: 50,
            postrun_ms: 3_000,
            postrun_fault_ms: 10_000,
            reset_timeout_ms: 30_000,
            reset_refire_ms: 3_000,
            stats_every: 10,
            replay_jpeg_quality: 85,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub video: VideoConfig,
    pub recognition: RecognitionConfig,
    pub sampling: SamplingConfig,
    pub campaign: CampaignConfig,
}

impl AppConfig {
    /// Rejects values the rig cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let video = &self.video;
        if video.ring_capacity == 0 {
            bail!("video.ring_capacity must be at least 1");
        }
        if video.fps == 0 {
            bail!("video.fps must be at least 1");
        }
        if video.crop.width() == 0 || video.crop.height() == 0 {
            bail!("video.crop is empty: {:?}", video.crop);
        }
        if !(1..=100).contains(&self.campaign.replay_jpeg_quality) {
            bail!(
                "campaign.replay_jpeg_quality must be 1-100, got {}",
                self.campaign.replay_jpeg_quality
            );
        }
        Ok(())
    }

    /// Resolves relative paths against `base` (the config file's directory).
    fn resolve_paths(mut self, base: &Path) -> Self {
        if self.recognition.templates_dir.is_relative() {
            self.recognition.templates_dir = base.join(&self.recognition.templates_dir);
        }
        self
    }
}

/// Loads configuration, falling back to defaults.
///
/// `explicit` (from `--config`) wins; otherwise `config.json` next to the
/// executable is used if present. Read and parse failures are logged and
/// produce defaults.
pub fn load_config(explicit: Option<&Path>) -> AppConfig {
    let exe_dir = crate::paths::exe_dir();
    let config_path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| exe_dir.join("config.json"));

    info!("Looking for config at: {}", config_path.display());
    let base = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| exe_dir.clone());

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!("Config loaded from {}", config_path.display());
                    return config.resolve_paths(&base);
                }
                Err(e) => warn!(
                    "Failed to parse {}: {}. Using defaults.",
                    config_path.display(),
                    e
                ),
            },
            Err(e) => warn!(
                "Failed to read {}: {}. Using defaults.",
                config_path.display(),
                e
            ),
        }
    } else {
        info!("{} not found. Using default config.", config_path.display());
    }

    AppConfig::default().resolve_paths(exe_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let json = r#"{ "serial": { "baud_rate": 9600 }, "campaign": { "max_trials": 5 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.settle_ms, 2_000);
        assert_eq!(config.campaign.max_trials, Some(5));
        assert_eq!(config.campaign.postrun_ms, 3_000);
        assert_eq!(config.video.crop.width(), 910);
        assert_eq!(config.video.crop.height(), 600);
    }

    #[test]
    fn test_step_skip_forms() {
        let mirror: StepSkip = serde_json::from_str(r#""mirror""#).unwrap();
        let fixed: StepSkip = serde_json::from_str(r#"{ "fixed": 30 }"#).unwrap();
        assert_eq!(mirror, StepSkip::Mirror);
        assert_eq!(fixed, StepSkip::Fixed(30));
    }

    #[test]
    fn test_load_explicit_file_resolves_templates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.json");
        fs::write(&path, r#"{ "recognition": { "templates_dir": "refs" } }"#).unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.recognition.templates_dir, dir.path().join("refs"));
    }

    #[test]
    fn test_validate_rejects_empty_ring() {
        assert!(AppConfig::default().validate().is_ok());

        let json = r#"{ "video": { "ring_capacity": 0 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ring_capacity"), "{}", err);

        let json = r#"{ "video": { "crop": { "left": 10, "top": 0, "right": 10, "bottom": 600 } } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.serial.baud_rate, 19_200);
        assert_eq!(config.sampling.step_fire_coupling.len(), 37);
    }
}
