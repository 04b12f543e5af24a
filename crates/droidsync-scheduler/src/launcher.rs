use std::ffi::OsString;
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::info;

use crate::error::{Result, SchedulerError};

/// Starts the job for a schedule as an independent unit of work.
///
/// Implementations must not wait for the job; the caller exits right after.
pub trait JobLauncher {
    fn spawn(&self, schedule: &str, log_path: &Path) -> Result<()>;
}

/// Runs `<program> <args...> <schedule>` in its own session.
///
/// The child gets `/dev/null` as stdin and appends stdout and stderr to the
/// log file, so it keeps running after the launcher and its terminal are gone.
#[derive(Debug, Clone)]
pub struct DetachedLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    workdir: Option<PathBuf>,
}

impl DetachedLauncher {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

impl JobLauncher for DetachedLauncher {
    fn spawn(&self, schedule: &str, log_path: &Path) -> Result<()> {
        let launch_err = |source: std::io::Error| SchedulerError::Launch {
            schedule: schedule.to_string(),
            source,
        };

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(launch_err)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(launch_err)?;
        let log_err = log.try_clone().map_err(launch_err)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(schedule)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        // SAFETY: pre_exec runs in the forked child before exec; setsid(2) is
        // async-signal-safe and touches no shared state. The new session
        // detaches the job from the launcher's controlling terminal and
        // process group.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(launch_err)?;
        info!(
            %schedule,
            pid = child.id(),
            log = %log_path.display(),
            "job launched"
        );
        // Dropping the handle neither waits for nor kills the child.
        drop(child);
        Ok(())
    }
}
