//! Executes the work behind a profile: its configured command.

use std::process::Command;

use anyhow::Result;
use droidsync_core::{config::ProfileConfig, SyncConfig};
use tracing::{error, info, warn};

/// Outcome of one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRun {
    pub profile: String,
    pub success: bool,
}

/// Run `names` in order. A failing profile does not stop the ones after it.
/// Unknown profile names are rejected before anything runs.
pub fn run_profiles(config: &SyncConfig, names: &[String], dry_run: bool) -> Result<Vec<ProfileRun>> {
    let profiles = names
        .iter()
        .map(|name| config.profile(name).map(|p| (name, p)))
        .collect::<droidsync_core::Result<Vec<_>>>()?;

    let results: Vec<ProfileRun> = profiles
        .into_iter()
        .map(|(name, profile)| ProfileRun {
            profile: name.clone(),
            success: run_profile(name, profile, dry_run),
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.success).count();
    info!(succeeded, total = results.len(), dry_run, "profiles complete");
    Ok(results)
}

fn run_profile(name: &str, profile: &ProfileConfig, dry_run: bool) -> bool {
    let Some((program, args)) = profile.command.split_first() else {
        error!(profile = %name, "profile has no command");
        return false;
    };
    if dry_run {
        info!(profile = %name, command = ?profile.command, workdir = ?profile.workdir, "dry run, not executing");
        return true;
    }

    info!(profile = %name, command = ?profile.command, "running profile");
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = &profile.workdir {
        cmd.current_dir(dir);
    }

    match cmd.status() {
        Ok(status) if status.success() => {
            info!(profile = %name, "profile succeeded");
            true
        }
        Ok(status) => {
            warn!(profile = %name, code = ?status.code(), "profile command failed");
            false
        }
        Err(e) => {
            error!(profile = %name, program = %program, error = %e, "could not start profile command");
            false
        }
    }
}
