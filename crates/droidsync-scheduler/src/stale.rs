use chrono::{Duration, NaiveDateTime};
use tracing::{error, warn};

use crate::{
    probe::ProcessProbe,
    types::{ScheduleState, ScheduleStatus},
};

/// Allowed gap between the OS start time of a job's process and the
/// `started_at` it recorded, covering launch latency and clock granularity.
pub const START_TIME_TOLERANCE_SECS: i64 = 60;

/// Decide whether a `running` record still has a live, legitimate process
/// behind it, and reap it if not.
///
/// A stale record is moved to `failed` in place (`finished_at = now`, pid
/// cleared); the caller is responsible for saving it. Only a process whose
/// start time matches the record is ever signalled.
///
/// Returns `true` if the record was reaped.
pub fn check_stale(
    state: &mut ScheduleState,
    timeout_hours: u32,
    now: NaiveDateTime,
    probe: &dyn ProcessProbe,
) -> bool {
    if state.status != ScheduleStatus::Running {
        return false;
    }

    let (Some(pid), Some(started_at)) = (state.pid, state.started_at) else {
        warn!(schedule = %state.schedule, "running without pid or start time, marking failed");
        mark_stale(state, now);
        return true;
    };

    if !probe.exists(pid) {
        warn!(schedule = %state.schedule, pid, "job process no longer exists");
        mark_stale(state, now);
        return true;
    }

    match probe.start_time(pid) {
        None => {
            warn!(schedule = %state.schedule, pid, "job process start time unreadable, marking failed");
            mark_stale(state, now);
            return true;
        }
        Some(proc_start) => {
            let skew_ms = (proc_start - started_at).num_milliseconds().abs();
            if skew_ms > START_TIME_TOLERANCE_SECS * 1000 {
                // The pid now belongs to something else; leave it alone.
                warn!(
                    schedule = %state.schedule,
                    pid,
                    skew_secs = skew_ms / 1000,
                    "pid reused by an unrelated process, marking failed"
                );
                mark_stale(state, now);
                return true;
            }
        }
    }

    let elapsed = now - started_at;
    if elapsed > Duration::hours(i64::from(timeout_hours)) {
        warn!(
            schedule = %state.schedule,
            pid,
            runtime_hours = elapsed.num_minutes() as f64 / 60.0,
            timeout_hours,
            "job exceeded stale timeout, terminating"
        );
        if let Err(e) = probe.terminate(pid) {
            if e.raw_os_error() == Some(libc::ESRCH) {
                warn!(schedule = %state.schedule, pid, "job exited before it could be signalled");
            } else {
                // Not escalated: the record still moves to failed, so a process
                // that ignores us keeps running untracked.
                error!(
                    schedule = %state.schedule,
                    pid,
                    error = %e,
                    "failed to signal stale job; it will no longer be tracked"
                );
            }
        }
        mark_stale(state, now);
        return true;
    }

    false
}

fn mark_stale(state: &mut ScheduleState, now: NaiveDateTime) {
    state.status = ScheduleStatus::Failed;
    state.finished_at = Some(now);
    state.pid = None;
}
