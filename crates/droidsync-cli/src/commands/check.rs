use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};
use droidsync_core::SyncConfig;
use droidsync_scheduler::{CheckOutcome, DetachedLauncher, Scheduler};
use tracing::{debug, info};

/// One check cycle. Launched jobs re-enter this binary as
/// `droidsync --config <path> run <schedule>`.
pub fn run(config: &SyncConfig, config_path: &Path) -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate droidsync executable")?;
    let config_path = std::fs::canonicalize(config_path)
        .with_context(|| format!("cannot resolve {}", config_path.display()))?;

    let mut launcher = DetachedLauncher::new(
        exe,
        [
            OsString::from("--config"),
            config_path.into_os_string(),
            OsString::from("run"),
        ],
    );
    if let Some(home) = std::env::var_os("HOME") {
        launcher = launcher.with_workdir(home);
    }

    let scheduler = Scheduler::from_config(config);
    let outcome = scheduler.run_check(&config.lock_path(), &launcher, &|name| {
        config.schedule_log_path(name)
    })?;

    match outcome {
        CheckOutcome::Busy => debug!("another check is running"),
        CheckOutcome::Idle => debug!("no schedules overdue"),
        CheckOutcome::Launched {
            schedule,
            overdue_minutes,
        } => info!(%schedule, overdue_minutes, log = %config.schedule_log_path(&schedule).display(), "launched"),
    }
    Ok(())
}
