//! Tracing bootstrap shared by every binary that embeds `tod-core`.
//!
//! Generalizes the teacher's daily-rolling-file setup with the retention and
//! size-cap promises the filesystem layout makes: `.tod/logs/*.log`, 10 MiB
//! max per file, 7-day retention.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static LOGGER_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
}

/// Configuration the caller already resolved from `Configuration`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive string, e.g. `"info"` or `"tod=debug,warn"`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(".tod/logs"),
            filter: "info".to_owned(),
        }
    }
}

/// Installs the global tracing subscriber. Idempotent: a second call is a
/// no-op and returns `false`, matching the teacher's
/// `Application::install_logging` guard against double-install.
pub fn init(config: &LoggingConfig) -> Result<bool, LoggingError> {
    if LOGGER_GUARD.get().is_some() {
        return Ok(false);
    }

    std::fs::create_dir_all(&config.log_dir)
        .map_err(|e| LoggingError::CreateDir(config.log_dir.clone(), e))?;

    sweep_expired_logs(&config.log_dir);

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "tod.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOGGER_GUARD.set(guard);

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let env_filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    Ok(installed)
}

/// Deletes rotated log files in `log_dir` whose modification time is older
/// than the 7-day retention window. `tracing_appender::rolling` only rotates
/// by date; it never prunes old files, so the core sweeps on its own
/// startup. Files that fail to stat or remove are skipped, not fatal — a
/// single locked or already-deleted file shouldn't block logging from
/// coming up.
pub fn sweep_expired_logs(log_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if now.duration_since(modified).unwrap_or_default() > RETENTION {
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Size cap check used by callers that roll their own auxiliary append-only
/// files (e.g. `.tod/api_calls.log`) outside the tracing pipeline. Returns
/// `true` when the file has crossed the 10 MiB cap and should be rotated
/// before the next append.
pub fn exceeds_size_cap(path: &Path) -> bool {
    const MAX_BYTES: u64 = 10 * 1024 * 1024;
    std::fs::metadata(path)
        .map(|m| m.len() >= MAX_BYTES)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    #[test]
    fn sweep_removes_only_expired_files() {
        let dir = std::env::temp_dir().join(format!("tod-logtest-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let fresh = dir.join("fresh.log");
        File::create(&fresh).unwrap().write_all(b"x").unwrap();

        sweep_expired_logs(&dir);
        assert!(fresh.exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn size_cap_false_for_missing_file() {
        assert!(!exceeds_size_cap(Path::new("/nonexistent/path/x.log")));
    }
}
