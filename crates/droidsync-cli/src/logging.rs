//! Subscriber setup and log file retention.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use droidsync_core::SyncConfig;
use tracing::{debug, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_PREFIXES: [&str; 2] = ["droidsync-", "schedule-"];

/// Where an unattended invocation writes its own log.
#[derive(Debug, Clone)]
pub struct LogFile {
    pub dir: PathBuf,
    pub retention_days: u32,
}

impl LogFile {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            dir: config.log_dir(),
            retention_days: config.general.log_retention_days,
        }
    }
}

/// Install the global subscriber: stdout always, plus a timestamped file in
/// `log_file.dir` when given. Old logs are pruned before the file is opened.
pub fn init(verbose: bool, log_file: Option<LogFile>) {
    let filter = if verbose {
        EnvFilter::new("droidsync=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("droidsync=info"))
    };

    let mut pruned = None;
    let mut file_error = None;
    let file_layer = log_file.and_then(|log_file| {
        pruned = Some(cleanup_old_logs(&log_file.dir, log_file.retention_days));
        match open_log_file(&log_file.dir) {
            Ok(appender) => Some(fmt::layer().with_ansi(false).with_writer(appender)),
            Err(e) => {
                file_error = Some(e);
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();

    if let Some(e) = file_error {
        warn!(error = %e, "could not open log file, logging to stdout only");
    }
    match pruned {
        Some(Ok(removed)) if !removed.is_empty() => {
            debug!(count = removed.len(), "removed old log files");
        }
        Some(Err(e)) => warn!(error = %e, "log cleanup failed"),
        _ => {}
    }
}

fn open_log_file(dir: &Path) -> io::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(log_file_stem(chrono::Local::now().naive_local()))
        .filename_suffix("log")
        .build(dir)
        .map_err(io::Error::other)
}

/// `droidsync-YYYYMMDD-HHMMSS`
fn log_file_stem(now: chrono::NaiveDateTime) -> String {
    format!("droidsync-{}", now.format("%Y%m%d-%H%M%S"))
}

/// Delete droidsync and schedule logs in `dir` not modified for
/// `retention_days`. Zero keeps everything. Returns the removed paths.
pub fn cleanup_old_logs(dir: &Path, retention_days: u32) -> io::Result<Vec<PathBuf>> {
    if retention_days == 0 || !dir.is_dir() {
        return Ok(Vec::new());
    }
    let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.ends_with(".log") || !LOG_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() || meta.modified().map_or(true, |m| m >= cutoff) {
            continue;
        }
        // Another invocation may have removed it first.
        if std::fs::remove_file(entry.path()).is_ok() {
            removed.push(entry.path());
        }
    }
    Ok(removed)
}
