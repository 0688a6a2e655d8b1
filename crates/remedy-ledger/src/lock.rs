//! Per-workspace cycle exclusivity
//!
//! One advisory lock file per state directory. The lock is held for the
//! whole cycle and released when the guard drops.

use crate::error::{LedgerError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_RETRY_MS: u64 = 50;

/// Held advisory lock on `<state dir>/cycle.lock`
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Take the lock or fail immediately if another cycle holds it
    ///
    /// # Errors
    /// Returns [`LedgerError::WorkspaceLocked`] if the lock is held
    pub fn try_acquire(path: &Path) -> Result<Self> {
        Self::acquire(path, Duration::ZERO)
    }

    /// Take the lock, retrying until `wait` has elapsed
    ///
    /// # Errors
    /// Returns [`LedgerError::WorkspaceLocked`] on timeout
    pub fn acquire(path: &Path, wait: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LedgerError::io(path, e))?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::WouldBlock || is_contended(&err) => {
                    if start.elapsed() >= wait {
                        return Err(LedgerError::WorkspaceLocked {
                            path: path.to_path_buf(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
                }
                Err(err) => return Err(LedgerError::io(path, err)),
            }
        }

        tracing::debug!(lock = %path.display(), "workspace lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(
                lock = %self.path.display(),
                error = %err,
                "failed to release workspace lock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".remedy/cycle.lock");

        let first = WorkspaceLock::try_acquire(&path).unwrap();
        assert!(matches!(
            WorkspaceLock::try_acquire(&path),
            Err(LedgerError::WorkspaceLocked { .. })
        ));
        drop(first);

        assert!(WorkspaceLock::try_acquire(&path).is_ok());
    }
}
