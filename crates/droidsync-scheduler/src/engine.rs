use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use droidsync_core::SyncConfig;
use tracing::info;

use crate::{
    clock::{Clock, SystemClock},
    error::{Result, SchedulerError},
    probe::{ProcessProbe, SystemProbe},
    schedule::next_run_for,
    stale,
    store::StateStore,
    types::{JobSchedule, ScheduleState, ScheduleStatus},
};

/// The scheduling engine for one invocation.
///
/// Nothing is cached between calls: every operation reads the state records
/// afresh, because the checker, the running job and the operator each work
/// through their own short-lived process.
pub struct Scheduler {
    schedules: BTreeMap<String, JobSchedule>,
    stale_timeout_hours: u32,
    pub(crate) store: StateStore,
    pub(crate) probe: Box<dyn ProcessProbe>,
    clock: Box<dyn Clock>,
}

impl Scheduler {
    /// Engine over `schedules` using the real process table and wall clock.
    pub fn new(
        schedules: impl IntoIterator<Item = JobSchedule>,
        stale_timeout_hours: u32,
        store: StateStore,
    ) -> Self {
        Self {
            schedules: schedules
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
            stale_timeout_hours,
            store,
            probe: Box::new(SystemProbe),
            clock: Box::new(SystemClock),
        }
    }

    /// Engine for a validated config, with file-backed state under its data dir.
    pub fn from_config(config: &SyncConfig) -> Self {
        let schedules = config
            .schedules
            .iter()
            .map(|(name, s)| JobSchedule::new(name.clone(), s.cron.clone()));
        Self::new(
            schedules,
            config.general.stale_job_timeout_hours,
            StateStore::open(config.state_dir()),
        )
    }

    pub fn with_probe(mut self, probe: impl ProcessProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn stale_timeout_hours(&self) -> u32 {
        self.stale_timeout_hours
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Configured schedules in name order.
    pub fn schedules(&self) -> impl Iterator<Item = &JobSchedule> {
        self.schedules.values()
    }

    pub fn schedule(&self, name: &str) -> Result<&JobSchedule> {
        self.schedules
            .get(name)
            .ok_or_else(|| SchedulerError::ScheduleNotFound {
                name: name.to_string(),
            })
    }

    /// Current state of a configured schedule, created on first sight.
    pub fn load_state(&self, name: &str) -> Result<ScheduleState> {
        let job = self.schedule(name)?;
        Ok(self.store.load(name, job.cron.as_ref(), self.now()))
    }

    pub fn save_state(&self, state: &ScheduleState) -> Result<()> {
        self.store.save(state)
    }

    /// Run the staleness monitor on `state` with the configured timeout.
    pub fn check_stale(&self, state: &mut ScheduleState) -> bool {
        stale::check_stale(
            state,
            self.stale_timeout_hours,
            self.now(),
            self.probe.as_ref(),
        )
    }

    /// State of every configured schedule, for display. Does not reap.
    pub fn states(&self) -> Vec<(&JobSchedule, ScheduleState)> {
        let now = self.now();
        self.schedules
            .values()
            .map(|job| (job, self.store.load(&job.name, job.cron.as_ref(), now)))
            .collect()
    }

    /// Operator reset: back to `pending` with a freshly computed `next_run`.
    ///
    /// `last_run` is kept. A job that is still running is not signalled; it
    /// will report its own outcome when it finishes.
    pub fn reset(&self, name: &str) -> Result<ScheduleState> {
        let job = self.schedule(name)?;
        let now = self.now();
        let mut state = self.store.load(name, job.cron.as_ref(), now);

        state.status = ScheduleStatus::Pending;
        state.pid = None;
        state.started_at = None;
        state.finished_at = None;
        state.next_run = next_run_for(job.cron.as_ref(), now);

        self.store.save(&state)?;
        info!(schedule = %name, next_run = ?state.next_run, "schedule reset");
        Ok(state)
    }
}
