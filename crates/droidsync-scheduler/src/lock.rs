use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};

/// Exclusive advisory lock held for the duration of one check cycle.
///
/// The lock file is a marker only; nothing is ever written to it. The lock is
/// released when the guard is dropped, or by the kernel if the process dies.
#[derive(Debug)]
pub struct CheckLock {
    file: File,
    path: PathBuf,
}

impl CheckLock {
    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let lock_err = |source: io::Error| SchedulerError::Lock {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(lock_err)?;

        // SAFETY: the fd is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                debug!(path = %path.display(), "check lock busy");
                return Ok(None);
            }
            return Err(lock_err(err));
        }

        debug!(path = %path.display(), "check lock acquired");
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CheckLock {
    fn drop(&mut self) {
        // SAFETY: the fd is still owned by `self.file`.
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            // Closing the file below releases it anyway.
            warn!(path = %self.path.display(), error = %io::Error::last_os_error(), "check lock unlock failed");
        } else {
            debug!(path = %self.path.display(), "check lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("check.lock");

        let first = CheckLock::try_acquire(&path).unwrap().expect("first acquire");
        assert!(CheckLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        let again = CheckLock::try_acquire(&path).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn lock_file_is_left_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.lock");
        let guard = CheckLock::try_acquire(&path).unwrap().unwrap();
        assert_eq!(guard.path(), path.as_path());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn unusable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for writing.
        assert!(matches!(
            CheckLock::try_acquire(dir.path()),
            Err(SchedulerError::Lock { .. })
        ));
    }
}
