use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the runlog file: `<out_dir>/runlog.csv`
pub fn runlog_path(out_dir: &Path) -> PathBuf {
    out_dir.join("runlog.csv")
}

/// Returns the replay directory: `<out_dir>/replays/`
pub fn replays_dir(out_dir: &Path) -> PathBuf {
    out_dir.join("replays")
}

/// Returns the logs directory: `<out_dir>/logs/`
pub fn logs_dir(out_dir: &Path) -> PathBuf {
    out_dir.join("logs")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories(out_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(logs_dir(out_dir))?;
    std::fs::create_dir_all(replays_dir(out_dir))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        ensure_directories(dir.path()).unwrap();

        assert!(logs_dir(dir.path()).is_dir());
        assert!(replays_dir(dir.path()).is_dir());
        assert_eq!(runlog_path(dir.path()), dir.path().join("runlog.csv"));
        assert!(!runlog_path(dir.path()).exists());
    }
}
