//! Hooks a launched job calls to record its own lifecycle.

use tracing::{error, info, warn};

use crate::{
    engine::Scheduler,
    error::Result,
    schedule::next_run,
    types::{ScheduleState, ScheduleStatus},
};

impl Scheduler {
    /// Mark `schedule` as running in this process.
    pub fn on_start(&self, schedule: &str) -> Result<ScheduleState> {
        let mut state = self.load_state(schedule)?;
        let now = self.now();

        state.status = ScheduleStatus::Running;
        state.started_at = Some(now);
        state.pid = Some(std::process::id());
        state.finished_at = None;

        self.save_state(&state)?;
        info!(%schedule, pid = state.pid, "schedule started");
        Ok(state)
    }

    /// Record the outcome of the current attempt.
    ///
    /// Success advances `next_run` for cron schedules. Failure leaves it
    /// untouched, so the retry happens at the slot that was missed.
    pub fn on_finish(&self, schedule: &str, success: bool) -> Result<ScheduleState> {
        let job = self.schedule(schedule)?;
        let mut state = self.load_state(schedule)?;
        let now = self.now();

        state.finished_at = Some(now);
        state.pid = None;
        if success {
            state.status = ScheduleStatus::Success;
            state.last_run = Some(now);
            if let Some(cron) = &job.cron {
                state.next_run = Some(next_run(cron, now));
            }
            info!(%schedule, next_run = ?state.next_run, "schedule finished");
        } else {
            state.status = ScheduleStatus::Failed;
            warn!(%schedule, next_run = ?state.next_run, "schedule failed, retry at next slot");
        }

        self.save_state(&state)?;
        Ok(state)
    }

    /// Call [`on_start`](Self::on_start) and return a guard that reports the
    /// outcome. A guard dropped without [`RunGuard::finish`] records failure.
    pub fn begin_run(&self, schedule: &str) -> Result<RunGuard<'_>> {
        self.on_start(schedule)?;
        Ok(RunGuard {
            scheduler: self,
            schedule: schedule.to_string(),
            finished: false,
        })
    }
}

/// Pending `on_finish` for a started run.
#[must_use = "dropping the guard records the run as failed"]
pub struct RunGuard<'a> {
    scheduler: &'a Scheduler,
    schedule: String,
    finished: bool,
}

impl RunGuard<'_> {
    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn finish(mut self, success: bool) -> Result<ScheduleState> {
        self.finished = true;
        self.scheduler.on_finish(&self.schedule, success)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(schedule = %self.schedule, "run ended without reporting, recording failure");
        if let Err(e) = self.scheduler.on_finish(&self.schedule, false) {
            error!(schedule = %self.schedule, error = %e, "could not record failed run");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::{at, engine, job};
    use crate::error::SchedulerError;
    use crate::stale::tests::FakeProbe;
    use crate::types::ScheduleStatus;

    #[test]
    fn start_records_this_process() {
        let (s, _, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(19, 3, 1), FakeProbe::default());
        let mut before = s.load_state("daily").unwrap();
        before.finished_at = Some(at(18, 3, 9));
        s.save_state(&before).unwrap();

        let state = s.on_start("daily").unwrap();
        assert_eq!(state.status, ScheduleStatus::Running);
        assert_eq!(state.started_at, Some(at(19, 3, 1)));
        assert_eq!(state.pid, Some(std::process::id()));
        assert!(state.finished_at.is_none());
        assert_eq!(state.next_run, before.next_run);
        assert_eq!(s.load_state("daily").unwrap(), state);
    }

    #[test]
    fn success_advances_next_run() {
        let (s, clock, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(18, 12, 0), FakeProbe::default());
        s.load_state("daily").unwrap();
        clock.set(at(19, 3, 0));
        s.on_start("daily").unwrap();

        clock.set(at(19, 3, 45));
        let state = s.on_finish("daily", true).unwrap();
        assert_eq!(state.status, ScheduleStatus::Success);
        assert_eq!(state.last_run, Some(at(19, 3, 45)));
        assert_eq!(state.finished_at, Some(at(19, 3, 45)));
        assert_eq!(state.next_run, Some(at(20, 3, 0)));
        assert!(state.pid.is_none());
        assert_eq!(state.started_at, Some(at(19, 3, 0)));
    }

    #[test]
    fn failure_keeps_next_run() {
        let (s, clock, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(18, 12, 0), FakeProbe::default());
        s.load_state("daily").unwrap();
        clock.set(at(19, 3, 0));
        let started = s.on_start("daily").unwrap();

        clock.set(at(19, 3, 10));
        let state = s.on_finish("daily", false).unwrap();
        assert_eq!(state.status, ScheduleStatus::Failed);
        assert_eq!(state.next_run, started.next_run);
        assert_eq!(state.next_run, Some(at(19, 3, 0)));
        assert_eq!(state.finished_at, Some(at(19, 3, 10)));
        assert!(state.last_run.is_none());
        assert!(state.pid.is_none());
    }

    #[test]
    fn manual_schedule_never_gains_next_run() {
        let (s, _, _) = engine(vec![job("adhoc", None)], at(19, 3, 0), FakeProbe::default());
        s.on_start("adhoc").unwrap();
        assert!(s.on_finish("adhoc", true).unwrap().next_run.is_none());
        s.on_start("adhoc").unwrap();
        assert!(s.on_finish("adhoc", false).unwrap().next_run.is_none());
    }

    #[test]
    fn unknown_schedule_is_rejected() {
        let (s, _, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(19, 3, 0), FakeProbe::default());
        assert!(matches!(s.on_start("nope"), Err(SchedulerError::ScheduleNotFound { .. })));
        assert!(matches!(s.on_finish("nope", true), Err(SchedulerError::ScheduleNotFound { .. })));
        assert!(!s.store().contains("nope"));
    }

    #[test]
    fn guard_reports_explicit_outcome() {
        let (s, clock, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(18, 12, 0), FakeProbe::default());
        s.load_state("daily").unwrap();
        clock.set(at(19, 3, 0));
        let guard = s.begin_run("daily").unwrap();
        assert_eq!(guard.schedule(), "daily");
        assert_eq!(s.load_state("daily").unwrap().status, ScheduleStatus::Running);

        let state = guard.finish(true).unwrap();
        assert_eq!(state.status, ScheduleStatus::Success);
        // Nothing further happens when the finished guard goes away.
        assert_eq!(s.load_state("daily").unwrap(), state);
    }

    #[test]
    fn dropped_guard_records_failure() {
        let (s, _, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(19, 3, 0), FakeProbe::default());
        let next_run = s.load_state("daily").unwrap().next_run;
        {
            let _guard = s.begin_run("daily").unwrap();
        }
        let state = s.load_state("daily").unwrap();
        assert_eq!(state.status, ScheduleStatus::Failed);
        assert_eq!(state.next_run, next_run);
        assert!(state.pid.is_none());
    }

    #[test]
    fn panicking_work_still_records_failure() {
        let (s, _, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(19, 3, 0), FakeProbe::default());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = s.begin_run("daily").unwrap();
            panic!("backup tool crashed");
        }));
        assert!(result.is_err());
        assert_eq!(s.load_state("daily").unwrap().status, ScheduleStatus::Failed);
    }
}
