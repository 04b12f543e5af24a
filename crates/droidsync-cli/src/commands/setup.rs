use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use droidsync_core::SyncConfig;
use tracing::{info, warn};

const CHECK_SCRIPT: &str = "check-schedule.sh";
const CHECK_PERIOD_MS: u32 = 15 * 60 * 1000;
const TERMUX_SHELL: &str = "/data/data/com.termux/files/usr/bin/sh";

/// Prepare the state directory and register the periodic check with
/// termux-job-scheduler. Registration failure is only a warning; manual
/// runs keep working without it.
pub fn run(config: &SyncConfig, config_path: &Path) -> Result<()> {
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("cannot create {}", state_dir.display()))?;
    println!("State directory: {}", state_dir.display());

    let exe = std::env::current_exe().context("cannot locate droidsync executable")?;
    let config_path = std::fs::canonicalize(config_path)
        .with_context(|| format!("cannot resolve {}", config_path.display()))?;
    let script = write_check_script(Path::new(&config.general.data_dir), &exe, &config_path)?;
    println!("Check script: {}", script.display());

    match register(&script) {
        Ok(()) => println!("Periodic check registered (every 15 minutes)."),
        Err(e) => {
            warn!(error = %e, "could not register periodic check");
            eprintln!("Automatic scheduling is not active: {e:#}");
            eprintln!("Install termux-api (pkg install termux-api) and run setup again.");
            eprintln!("Manual runs still work.");
        }
    }
    Ok(())
}

fn write_check_script(dir: &Path, exe: &Path, config_path: &Path) -> Result<PathBuf> {
    let shell = if Path::new(TERMUX_SHELL).exists() {
        TERMUX_SHELL
    } else {
        "/bin/sh"
    };
    let path = dir.join(CHECK_SCRIPT);
    let body = format!(
        "#!{shell}\nexec {} --config {} check\n",
        shell_quote(&exe.to_string_lossy()),
        shell_quote(&config_path.to_string_lossy()),
    );
    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, body).with_context(|| format!("cannot write {}", path.display()))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    info!(path = %path.display(), "check script written");
    Ok(path)
}

fn register(script: &Path) -> Result<()> {
    let output = Command::new("termux-job-scheduler")
        .arg("schedule")
        .arg("--script")
        .arg(script)
        .args(["--period-ms", &CHECK_PERIOD_MS.to_string(), "--persisted", "true"])
        .output()
        .context("termux-job-scheduler not available")?;
    if !output.status.success() {
        anyhow::bail!(
            "termux-job-scheduler failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
