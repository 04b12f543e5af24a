use chrono::NaiveDateTime;
use droidsync_core::CronExpr;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a schedule's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Waiting for its next_run time.
    Pending,
    /// A launched job has reported that it started and has not finished yet.
    Running,
    /// Last run finished successfully.
    Success,
    /// Last run failed, was reaped as stale, or never reported back.
    Failed,
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Running => "running",
            ScheduleStatus::Success => "success",
            ScheduleStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "running" => Ok(ScheduleStatus::Running),
            "success" => Ok(ScheduleStatus::Success),
            "failed" => Ok(ScheduleStatus::Failed),
            other => Err(format!("unknown schedule status: {other}")),
        }
    }
}

/// The persisted record for one schedule.
///
/// Timestamps are naive local wall-clock times, serialized as ISO-8601 without
/// an offset. Absent values are written as explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    /// Name of the owning schedule; always equals the record's key.
    pub schedule: String,
    /// Completion time of the last *successful* run.
    pub last_run: Option<NaiveDateTime>,
    /// Next due time. Present if and only if the schedule has a cron expression.
    pub next_run: Option<NaiveDateTime>,
    pub status: ScheduleStatus,
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    /// Process id of the running attempt.
    pub pid: Option<u32>,
}

impl ScheduleState {
    /// A never-run schedule. `next_run` must already be computed by the caller.
    pub fn initial(schedule: &str, next_run: Option<NaiveDateTime>) -> Self {
        Self {
            schedule: schedule.to_string(),
            last_run: None,
            next_run,
            status: ScheduleStatus::Pending,
            started_at: None,
            finished_at: None,
            pid: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ScheduleStatus::Running
    }

    /// True once `now` has reached `next_run`. Manual schedules are never due.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.next_run.is_some_and(|next| now >= next)
    }
}

/// What the engine knows about a configured schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSchedule {
    pub name: String,
    /// `None` for manual schedules.
    pub cron: Option<CronExpr>,
}

impl JobSchedule {
    pub fn new(name: impl Into<String>, cron: Option<CronExpr>) -> Self {
        Self {
            name: name.into(),
            cron,
        }
    }
}

/// A schedule whose next_run has passed, with how late it is.
#[derive(Debug, Clone, PartialEq)]
pub struct Overdue {
    pub schedule: String,
    pub overdue_minutes: f64,
}
