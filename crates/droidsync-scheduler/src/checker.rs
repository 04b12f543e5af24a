use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{engine::Scheduler, error::Result, launcher::JobLauncher, lock::CheckLock};

/// What a single check cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Another check cycle holds the lock; nothing was touched.
    Busy,
    /// No schedule was overdue.
    Idle,
    /// The most overdue schedule was handed to the launcher.
    Launched {
        schedule: String,
        overdue_minutes: f64,
    },
}

impl Scheduler {
    /// One check cycle: take the lock, launch the most overdue schedule if
    /// any, release the lock.
    ///
    /// `log_path` maps a schedule name to the file its job output goes to.
    /// A launch failure is returned; the schedule stays overdue and is
    /// reconsidered next cycle.
    pub fn run_check(
        &self,
        lock_path: &Path,
        launcher: &dyn JobLauncher,
        log_path: &dyn Fn(&str) -> PathBuf,
    ) -> Result<CheckOutcome> {
        let Some(_lock) = CheckLock::try_acquire(lock_path)? else {
            info!(lock = %lock_path.display(), "check already in progress, skipping");
            return Ok(CheckOutcome::Busy);
        };

        let overdue = self.overdue_schedules();
        debug!(count = overdue.len(), "overdue schedules");
        let Some(top) = overdue.into_iter().next() else {
            debug!("nothing overdue");
            return Ok(CheckOutcome::Idle);
        };

        info!(
            schedule = %top.schedule,
            overdue_minutes = top.overdue_minutes,
            "launching most overdue schedule"
        );
        launcher.spawn(&top.schedule, &log_path(&top.schedule))?;

        Ok(CheckOutcome::Launched {
            schedule: top.schedule,
            overdue_minutes: top.overdue_minutes,
        })
    }
}
