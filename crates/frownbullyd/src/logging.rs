//! Per-invocation log file plus stderr.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `frownbully_YYYYmmdd_HHMMSS.log`
pub fn log_file_name() -> String {
    format!("frownbully_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), one
/// layer to stderr and one plain-text layer appending to a fresh log file
/// under `log_dir`. Returns the log file path.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let path = log_dir.join(log_file_name());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_shape() {
        let name = log_file_name();
        assert!(name.starts_with("frownbully_"));
        assert!(name.ends_with(".log"));
        // frownbully_ + 8 date digits + _ + 6 time digits + .log
        assert_eq!(name.len(), "frownbully_".len() + 15 + ".log".len());
    }

    #[test]
    fn test_init_creates_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("nested").join("logs");

        let path = init(&log_dir).unwrap();
        assert!(path.starts_with(&log_dir));
        assert!(path.exists());

        tracing::info!("written to file");
        // Installing twice is refused rather than silently replacing.
        assert!(init(&log_dir).is_err());
    }
}
