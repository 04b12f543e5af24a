//! `droidsync-scheduler` — crash-tolerant schedule execution for droidsync.
//!
//! # Overview
//!
//! There is no daemon. An external trigger invokes a check cycle every few
//! minutes; [`Scheduler::run_check`] takes an advisory lock, picks the most
//! overdue schedule and launches it as a detached process. The launched job
//! reports its own start and finish through [`Scheduler::begin_run`]. Each
//! schedule's state lives in its own JSON record, which is the only thing
//! that survives between invocations.
//!
//! # Schedule lifecycle
//!
//! | Status    | Entered when                                              |
//! |-----------|-----------------------------------------------------------|
//! | `pending` | first seen, reset, or a failed run reached its next slot  |
//! | `running` | the launched job called `on_start`                        |
//! | `success` | the job finished cleanly; `next_run` advanced             |
//! | `failed`  | the job failed or went stale; `next_run` left as it was   |

pub mod checker;
pub mod clock;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod lock;
pub mod overdue;
pub mod probe;
pub mod reporter;
pub mod schedule;
pub mod stale;
pub mod store;
pub mod types;

pub use checker::CheckOutcome;
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use launcher::{DetachedLauncher, JobLauncher};
pub use lock::CheckLock;
pub use probe::{ProcessProbe, SystemProbe};
pub use reporter::RunGuard;
pub use store::{FileBackend, MemoryBackend, StateBackend, StateStore};
pub use types::{JobSchedule, Overdue, ScheduleState, ScheduleStatus};
