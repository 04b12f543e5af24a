use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::{
    engine::Scheduler,
    stale,
    types::{Overdue, ScheduleState, ScheduleStatus},
};

impl Scheduler {
    /// Cron schedules whose `next_run` has passed, most overdue first.
    ///
    /// Reaps stale `running` records and re-arms `failed` ones that have
    /// reached their next slot, persisting both. Problems with one schedule
    /// never stop the others from being considered.
    ///
    /// Entries with equal lateness keep name order.
    pub fn overdue_schedules(&self) -> Vec<Overdue> {
        let now = self.now();
        let mut overdue: Vec<Overdue> = self
            .schedules()
            .filter_map(|job| {
                let cron = job.cron.as_ref()?;
                let mut state = self.store.load(&job.name, Some(cron), now);
                self.evaluate(&mut state, now)
            })
            .collect();

        overdue.sort_by(|a, b| b.overdue_minutes.total_cmp(&a.overdue_minutes));
        overdue
    }

    fn evaluate(&self, state: &mut ScheduleState, now: NaiveDateTime) -> Option<Overdue> {
        if stale::check_stale(state, self.stale_timeout_hours(), now, self.probe.as_ref()) {
            self.persist(state);
        }

        if state.is_running() {
            return None;
        }
        if state.status == ScheduleStatus::Failed && state.is_due(now) {
            info!(schedule = %state.schedule, next_run = ?state.next_run, "failed schedule eligible for retry");
            state.status = ScheduleStatus::Pending;
            self.persist(state);
        }

        if !matches!(state.status, ScheduleStatus::Pending | ScheduleStatus::Success) {
            return None;
        }
        let next_run = state.next_run.filter(|next| now >= *next)?;
        let overdue_minutes = (now - next_run).num_seconds() as f64 / 60.0;
        debug!(schedule = %state.schedule, overdue_minutes, "schedule overdue");
        Some(Overdue {
            schedule: state.schedule.clone(),
            overdue_minutes,
        })
    }

    fn persist(&self, state: &ScheduleState) {
        if let Err(e) = self.store.save(state) {
            warn!(schedule = %state.schedule, error = %e, "could not save schedule state");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::{at, engine, job};
    use crate::stale::tests::FakeProbe;
    use crate::types::ScheduleStatus;
    use chrono::Duration;

    #[test]
    fn overdue_minutes_measured_from_next_run() {
        let (s, clock, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(18, 12, 0), FakeProbe::default());
        assert_eq!(s.load_state("daily").unwrap().next_run, Some(at(19, 3, 0)));

        clock.set(at(19, 5, 0));
        let overdue = s.overdue_schedules();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].schedule, "daily");
        assert_eq!(overdue[0].overdue_minutes, 120.0);
    }

    #[test]
    fn most_overdue_first() {
        let (s, clock, _) = engine(
            vec![job("hourly", Some("30 * * * *")), job("daily", Some("0 3 * * *"))],
            at(19, 2, 50),
            FakeProbe::default(),
        );
        s.load_state("daily").unwrap();
        s.load_state("hourly").unwrap();

        // hourly already covered its 03:30 slot; the 04:30 one is still owed.
        let mut hourly = s.load_state("hourly").unwrap();
        hourly.next_run = Some(at(19, 4, 30));
        s.save_state(&hourly).unwrap();

        clock.set(at(19, 5, 0));
        let overdue: Vec<_> = s
            .overdue_schedules()
            .into_iter()
            .map(|o| (o.schedule, o.overdue_minutes))
            .collect();
        assert_eq!(
            overdue,
            vec![("daily".to_string(), 120.0), ("hourly".to_string(), 30.0)]
        );
    }

    #[test]
    fn exactly_due_is_included_with_zero_minutes() {
        let (s, clock, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(18, 12, 0), FakeProbe::default());
        s.load_state("daily").unwrap();
        clock.set(at(19, 3, 0));
        let overdue = s.overdue_schedules();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].overdue_minutes, 0.0);

        clock.set(at(19, 2, 59));
        assert!(s.overdue_schedules().is_empty());
    }

    #[test]
    fn fractional_minutes_are_kept() {
        let (s, clock, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(18, 12, 0), FakeProbe::default());
        s.load_state("daily").unwrap();
        clock.set(at(19, 3, 0) + Duration::seconds(90));
        assert_eq!(s.overdue_schedules()[0].overdue_minutes, 1.5);
    }

    #[test]
    fn failed_schedule_is_rearmed_with_unchanged_next_run() {
        let (s, clock, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(19, 5, 0), FakeProbe::default());
        let mut state = s.load_state("daily").unwrap();
        state.status = ScheduleStatus::Failed;
        state.next_run = Some(at(19, 3, 0));
        state.finished_at = Some(at(19, 3, 20));
        s.save_state(&state).unwrap();

        clock.set(at(19, 5, 0));
        let overdue = s.overdue_schedules();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].overdue_minutes, 120.0);

        let after = s.load_state("daily").unwrap();
        assert_eq!(after.status, ScheduleStatus::Pending);
        assert_eq!(after.next_run, Some(at(19, 3, 0)));
    }

    #[test]
    fn failed_schedule_waits_for_next_slot() {
        let (s, _, _) = engine(vec![job("daily", Some("0 3 * * *"))], at(19, 5, 0), FakeProbe::default());
        let mut state = s.load_state("daily").unwrap();
        state.status = ScheduleStatus::Failed;
        s.save_state(&state).unwrap();

        // next_run is tomorrow 03:00.
        assert!(s.overdue_schedules().is_empty());
        assert_eq!(s.load_state("daily").unwrap().status, ScheduleStatus::Failed);
    }

    #[test]
    fn running_schedule_is_never_selected() {
        let started = at(19, 4, 0);
        let (s, clock, probe) = engine(
            vec![job("daily", Some("0 3 * * *"))],
            at(18, 12, 0),
            FakeProbe::with_process(4242, started),
        );
        let mut state = s.load_state("daily").unwrap();
        state.status = ScheduleStatus::Running;
        state.pid = Some(4242);
        state.started_at = Some(started);
        s.save_state(&state).unwrap();

        clock.set(at(19, 5, 0));
        assert!(s.overdue_schedules().is_empty());
        assert!(probe.signalled().is_empty());
        assert_eq!(s.load_state("daily").unwrap().status, ScheduleStatus::Running);
    }

    #[test]
    fn dead_running_job_is_reaped_and_then_retried() {
        let (s, clock, probe) = engine(vec![job("daily", Some("0 3 * * *"))], at(18, 12, 0), FakeProbe::default());
        let mut state = s.load_state("daily").unwrap();
        state.status = ScheduleStatus::Running;
        state.pid = Some(4242);
        state.started_at = Some(at(19, 3, 0));
        s.save_state(&state).unwrap();

        clock.set(at(19, 5, 0));
        let overdue = s.overdue_schedules();
        assert_eq!(overdue.len(), 1);
        assert!(probe.signalled().is_empty());

        let after = s.load_state("daily").unwrap();
        assert_eq!(after.status, ScheduleStatus::Pending);
        assert_eq!(after.finished_at, Some(at(19, 5, 0)));
        assert!(after.pid.is_none());
    }

    #[test]
    fn manual_schedules_never_appear() {
        let (s, clock, _) = engine(
            vec![job("adhoc", None), job("daily", Some("0 3 * * *"))],
            at(18, 12, 0),
            FakeProbe::default(),
        );
        s.load_state("adhoc").unwrap();
        s.load_state("daily").unwrap();

        clock.set(at(30, 0, 0));
        let names: Vec<_> = s.overdue_schedules().into_iter().map(|o| o.schedule).collect();
        assert_eq!(names, vec!["daily"]);
        assert!(s.load_state("adhoc").unwrap().next_run.is_none());
    }

    #[test]
    fn equal_lateness_keeps_name_order() {
        let (s, clock, _) = engine(
            vec![job("b-photos", Some("0 3 * * *")), job("a-docs", Some("0 3 * * *"))],
            at(18, 12, 0),
            FakeProbe::default(),
        );
        s.load_state("a-docs").unwrap();
        s.load_state("b-photos").unwrap();
        clock.set(at(19, 4, 0));
        let names: Vec<_> = s.overdue_schedules().into_iter().map(|o| o.schedule).collect();
        assert_eq!(names, vec!["a-docs", "b-photos"]);
    }
}
