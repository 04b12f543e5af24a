use std::process::ExitCode;

use anyhow::{Context, Result};
use droidsync_core::SyncConfig;
use droidsync_scheduler::Scheduler;
use tracing::info;

use crate::work::{run_profiles, ProfileRun};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Schedule(String),
    Profile(String),
    All,
}

pub fn run(config: &SyncConfig, target: &RunTarget, dry_run: bool) -> Result<ExitCode> {
    let ok = execute(config, &Scheduler::from_config(config), target, dry_run)?;
    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run the target's profiles. Only a real schedule run reports to the
/// scheduler; profile runs and dry runs leave state alone.
fn execute(
    config: &SyncConfig,
    scheduler: &Scheduler,
    target: &RunTarget,
    dry_run: bool,
) -> Result<bool> {
    let profiles = match target {
        RunTarget::Schedule(name) => config.schedule(name)?.profiles.clone(),
        RunTarget::Profile(name) => vec![config.profile(name).map(|_| name.clone())?],
        RunTarget::All => config.profiles.keys().cloned().collect(),
    };
    if profiles.is_empty() {
        anyhow::bail!("no profiles to run");
    }

    let RunTarget::Schedule(schedule) = target else {
        return Ok(all_succeeded(&run_profiles(config, &profiles, dry_run)?));
    };
    if dry_run {
        info!(%schedule, "dry run, schedule state untouched");
        return Ok(all_succeeded(&run_profiles(config, &profiles, true)?));
    }

    let guard = scheduler
        .begin_run(schedule)
        .with_context(|| format!("could not record start of '{schedule}'"))?;
    // An error here drops the guard, which records the failure.
    let ok = all_succeeded(&run_profiles(config, &profiles, false)?);
    let state = guard.finish(ok)?;
    info!(%schedule, status = %state.status, next_run = ?state.next_run, "schedule run recorded");
    Ok(ok)
}

fn all_succeeded(results: &[ProfileRun]) -> bool {
    results.iter().all(|r| r.success)
}
