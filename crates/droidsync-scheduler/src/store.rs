//! Per-schedule state records.
//!
//! [`StateStore`] never fails a load: a missing record becomes a fresh
//! `pending` state, and a record that cannot be read or parsed is logged and
//! replaced the same way. Saves do propagate errors.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use droidsync_core::CronExpr;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SchedulerError},
    schedule::next_run_for,
    types::ScheduleState,
};

/// Raw key-value storage for state documents.
pub trait StateBackend: Send + Sync {
    /// `Ok(None)` when no document exists for `key`.
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    /// Replace the document for `key`.
    fn put(&self, key: &str, document: &str) -> io::Result<()>;

    fn contains(&self, key: &str) -> bool;
}

/// One `<key>.json` file per schedule under a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("schedule name {key:?} cannot be used as a file name"),
            ));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl StateBackend for FileBackend {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)?) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&self, key: &str, document: &str) -> io::Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // Write-then-rename: a crash mid-write leaves the previous record intact.
        // Each writer gets its own temp file, so the checker and a finishing job
        // can save the same schedule at once.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(document.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Volatile backend for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs.get(key).cloned())
    }

    fn put(&self, key: &str, document: &str) -> io::Result<()> {
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.insert(key.to_string(), document.to_string());
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.contains_key(key)
    }
}

impl<B: StateBackend + ?Sized> StateBackend for std::sync::Arc<B> {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, document: &str) -> io::Result<()> {
        (**self).put(key, document)
    }

    fn contains(&self, key: &str) -> bool {
        (**self).contains(key)
    }
}

/// Typed load/save of [`ScheduleState`] over any [`StateBackend`].
pub struct StateStore {
    backend: Box<dyn StateBackend>,
}

impl StateStore {
    pub fn new(backend: impl StateBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// File-backed store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(dir))
    }

    /// In-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Load the state for `name`, creating a fresh record when there is none.
    ///
    /// Fresh records get `next_run` computed from `now` when `cron` is set and
    /// are persisted right away. A stored record that disagrees with the
    /// schedule's kind (cron vs manual) has its `next_run` repaired and saved.
    pub fn load(&self, name: &str, cron: Option<&CronExpr>, now: NaiveDateTime) -> ScheduleState {
        let stored = match self.backend.get(name) {
            Ok(Some(doc)) => match decode(name, &doc) {
                Ok(state) => Some(state),
                Err(reason) => {
                    warn!(schedule = %name, %reason, "state record corrupted, recreating");
                    None
                }
            },
            Ok(None) => {
                debug!(schedule = %name, "no state record yet");
                None
            }
            Err(e) => {
                warn!(schedule = %name, error = %e, "state record unreadable, recreating");
                None
            }
        };

        let (state, dirty) = match stored {
            Some(mut state) => {
                let repaired = match (cron, state.next_run) {
                    (Some(_), None) | (None, Some(_)) => {
                        state.next_run = next_run_for(cron, now);
                        info!(schedule = %name, next_run = ?state.next_run, "next_run repaired for schedule kind");
                        true
                    }
                    _ => false,
                };
                (state, repaired)
            }
            None => (ScheduleState::initial(name, next_run_for(cron, now)), true),
        };

        if dirty {
            if let Err(e) = self.save(&state) {
                warn!(schedule = %name, error = %e, "could not persist initial state");
            }
        }
        state
    }

    /// Write the full record for `state.schedule`.
    pub fn save(&self, state: &ScheduleState) -> Result<()> {
        let doc = serde_json::to_string_pretty(state)?;
        self.backend
            .put(&state.schedule, &doc)
            .map_err(|source| SchedulerError::Store {
                schedule: state.schedule.clone(),
                source,
            })
    }

    /// Whether any record exists for `name`, valid or not.
    pub fn contains(&self, name: &str) -> bool {
        self.backend.contains(name)
    }
}

fn decode(name: &str, doc: &str) -> std::result::Result<ScheduleState, String> {
    let state: ScheduleState = serde_json::from_str(doc).map_err(|e| e.to_string())?;
    if state.schedule != name {
        return Err(format!(
            "record belongs to schedule '{}'",
            state.schedule
        ));
    }
    Ok(state)
}
