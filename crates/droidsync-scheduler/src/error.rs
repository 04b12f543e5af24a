use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Corrupt state records and stale jobs are recovered in place and never
/// surface here.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Reading or writing a state record failed.
    #[error("State store error for '{schedule}': {source}")]
    Store {
        schedule: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No schedule with the given name is configured.
    #[error("Schedule not found: {name}")]
    ScheduleNotFound { name: String },

    /// The detached job process could not be started.
    #[error("Failed to launch job for '{schedule}': {source}")]
    Launch {
        schedule: String,
        #[source]
        source: std::io::Error,
    },

    /// The check lock file could not be opened or locked.
    #[error("Lock error on {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
