use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cron::CronExpr;
use crate::error::{Result, SyncError};

pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_STALE_JOB_TIMEOUT_HOURS: u32 = 24;
pub const MIN_STALE_JOB_TIMEOUT_HOURS: u32 = 1;
pub const MAX_STALE_JOB_TIMEOUT_HOURS: u32 = 168; // one week
pub const ENV_PREFIX: &str = "DROIDSYNC_";

/// Top-level config (config.toml + DROIDSYNC_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    #[serde(default)]
    pub schedules: BTreeMap<String, ScheduleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory for invocation logs and per-schedule job logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Logs older than this are removed on startup. `0` keeps everything.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
    /// A running job older than this is terminated and marked failed.
    #[serde(default = "default_stale_job_timeout_hours")]
    pub stale_job_timeout_hours: u32,
    /// Holds the per-schedule state records and the check lock.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            stale_job_timeout_hours: DEFAULT_STALE_JOB_TIMEOUT_HOURS,
            data_dir: default_data_dir(),
        }
    }
}

/// One unit of work: an external command that performs the transfer.
///
/// The command's exit status is the only thing droidsync looks at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub command: Vec<String>,
    pub workdir: Option<String>,
}

/// A named group of profiles, optionally run on a cron schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub profiles: Vec<String>,
    /// `None` makes this a manual schedule that is never picked by `check`.
    #[serde(default)]
    pub cron: Option<CronExpr>,
}

fn default_log_retention_days() -> u32 {
    DEFAULT_LOG_RETENTION_DAYS
}
fn default_stale_job_timeout_hours() -> u32 {
    DEFAULT_STALE_JOB_TIMEOUT_HOURS
}
fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
fn default_log_dir() -> String {
    format!("{}/logs", home_dir())
}
fn default_data_dir() -> String {
    format!("{}/.local/share/droidsync", home_dir())
}

/// `~/.config/droidsync/config.toml`
pub fn default_config_path() -> PathBuf {
    PathBuf::from(home_dir())
        .join(".config")
        .join("droidsync")
        .join("config.toml")
}

impl SyncConfig {
    /// Load config from a TOML file with DROIDSYNC_* env var overrides, then validate it.
    ///
    /// Nested keys in env vars are separated by a double underscore, e.g.
    /// `DROIDSYNC_GENERAL__STALE_JOB_TIMEOUT_HOURS=12`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: SyncConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        config.validate()?;
        debug!(
            path = %path.display(),
            profiles = config.profiles.len(),
            schedules = config.schedules.len(),
            "config loaded"
        );
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let timeout = self.general.stale_job_timeout_hours;
        if !(MIN_STALE_JOB_TIMEOUT_HOURS..=MAX_STALE_JOB_TIMEOUT_HOURS).contains(&timeout) {
            return Err(SyncError::Config(format!(
                "general.stale_job_timeout_hours must be between {MIN_STALE_JOB_TIMEOUT_HOURS} and {MAX_STALE_JOB_TIMEOUT_HOURS}, got {timeout}"
            )));
        }

        for (name, profile) in &self.profiles {
            if profile.command.is_empty() || profile.command[0].trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "profiles.{name}.command must name a program"
                )));
            }
        }

        for (name, schedule) in &self.schedules {
            if schedule.profiles.is_empty() {
                return Err(SyncError::Config(format!(
                    "schedules.{name}.profiles must not be empty"
                )));
            }
            for profile in &schedule.profiles {
                if !self.profiles.contains_key(profile) {
                    return Err(SyncError::Config(format!(
                        "Schedule '{name}' references unknown profile: {profile}"
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn profile(&self, name: &str) -> Result<&ProfileConfig> {
        self.profiles
            .get(name)
            .ok_or_else(|| SyncError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    pub fn schedule(&self, name: &str) -> Result<&ScheduleConfig> {
        self.schedules
            .get(name)
            .ok_or_else(|| SyncError::ScheduleNotFound {
                name: name.to_string(),
            })
    }

    /// `<data_dir>/state`, one JSON record per schedule.
    pub fn state_dir(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join("state")
    }

    /// Advisory lock taken by every check cycle.
    pub fn lock_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join("check.lock")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.log_dir)
    }

    /// Append-mode log for jobs launched by `check`.
    pub fn schedule_log_path(&self, schedule: &str) -> PathBuf {
        self.log_dir().join(format!("schedule-{schedule}.log"))
    }
}
