//! Advisory run lock so only one process drives a checkpoint at a time

use super::state::ResumeError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file handle; hold the guard from [`RunLock::try_hold`] for the run
pub struct RunLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Open or create the lock file at `path`
    pub fn open(path: &Path) -> Result<Self, ResumeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Take the exclusive lock without blocking
    ///
    /// Fails immediately when another run holds it. The lock is released when
    /// the guard is dropped.
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>, ResumeError> {
        let path = self.path.display().to_string();
        self.lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "another run holds {path}; wait for it to finish ({e})"
            ))
        })
    }
}
