//! Exclusive run lock on a destination directory.

use crate::error::JournalError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file name inside the destination root
pub const LOCK_FILE_NAME: &str = ".orbit.lock";

/// Held for the whole of a run, resume or undo. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Take the lock without waiting; another holder is an error
    pub fn acquire(destination: &Path) -> Result<Self, JournalError> {
        let path = destination.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| JournalError::Write {
                path: path.clone(),
                source,
            })?;

        fs2::FileExt::try_lock_exclusive(&file).map_err(|e| {
            tracing::debug!("Lock on {} unavailable: {}", path.display(), e);
            JournalError::Locked { path: path.clone() }
        })?;

        tracing::debug!("Acquired {}", path.display());
        Ok(Self { path, file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}
