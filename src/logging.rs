//! Tracing subscriber setup: console plus an append-only log file.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Name of the log file inside the logs directory.
pub const LOG_FILE_NAME: &str = "javelin-rig.log";

/// Local wall-clock timestamps, `HH:MM:SS.mmm`.
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Installs the global subscriber.
///
/// The level comes from `RUST_LOG` and defaults to `info`. The file layer
/// appends to `<log_dir>/javelin-rig.log` without ANSI colors.
pub fn init(log_dir: &Path) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = tracing_subscriber::fmt::layer()
        .with_timer(LocalTime)
        .with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalTime)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(console.and_then(file_layer).with_filter(env_filter))
        .try_init()
        .map_err(io::Error::other)
}
