//! Exclusive state lock
//!
//! Exactly one executor may mutate a state document at a time. The lock is
//! a sibling file created with `create_new`, holding the owner's identity.
//! Acquisition polls until a deadline (zero timeout fails fast). A crashed
//! holder leaves the file behind; the holder info in the conflict error
//! lets an operator recover with `force-unlock <lock-id>`.

use crate::error::{Result, StateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Identity of a lock holder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    pub id: String,
    pub pid: u32,
    /// What the holder is doing (`plan`, `apply`, ...)
    pub operation: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(operation: &str) -> Self {
        let pid = std::process::id();
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self {
            id: format!("{pid:x}-{nanos:x}"),
            pid,
            operation: operation.to_string(),
            acquired_at: Utc::now(),
        }
    }
}

/// A held lock; releases on `release()` or best-effort on drop
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl LockGuard {
    /// Try to create the lock file, polling until `timeout` elapses
    pub(crate) fn acquire(path: PathBuf, operation: &str, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::try_acquire(&path, operation) {
                Ok(guard) => return Ok(guard),
                Err(err) => {
                    if Instant::now() >= deadline {
                        return Err(err);
                    }
                    log::debug!("state locked, retrying in {POLL_INTERVAL:?}");
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    fn try_acquire(path: &Path, operation: &str) -> Result<Self> {
        let info = LockInfo::new(operation);
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        match options.open(path) {
            Ok(mut file) => {
                let body = serde_json::to_string_pretty(&info).map_err(|e| {
                    StateError::LockCorrupt {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?;
                file.write_all(body.as_bytes())
                    .and_then(|()| file.sync_all())
                    .map_err(|source| StateError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                log::debug!("acquired state lock {} for {operation}", info.id);
                Ok(Self {
                    path: path.to_path_buf(),
                    info,
                    released: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match Self::holder(path)? {
                    Some(holder) => Err(StateError::LockConflict { holder }),
                    // Holder released between our open and read; retry path.
                    None => Err(StateError::LockConflict {
                        holder: LockInfo::new("unknown"),
                    }),
                }
            }
            Err(source) => Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Read the current holder, if a lock file exists
    pub(crate) fn holder(path: &Path) -> Result<Option<LockInfo>> {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                StateError::LockCorrupt {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Remove an abandoned lock after verifying the id matches
    pub(crate) fn force_unlock(path: &Path, id: &str) -> Result<LockInfo> {
        let holder = Self::holder(path)?.ok_or(StateError::NotLocked)?;
        if holder.id != id {
            return Err(StateError::LockIdMismatch {
                given: id.to_string(),
                actual: holder.id,
            });
        }
        fs::remove_file(path).map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("force-unlocked state lock {}", holder.id);
        Ok(holder)
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock explicitly, surfacing IO errors
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            // Best-effort cleanup on panic or early return.
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("failed to remove lock {}: {e}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStateStore;

    fn store(dir: &tempfile::TempDir) -> FileStateStore {
        FileStateStore::new(dir.path().join("converge.state.json"))
    }

    #[test]
    fn second_acquire_fails_fast_with_holder_info() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let guard = store.lock("apply", Duration::ZERO).unwrap();
        let err = store.lock("plan", Duration::ZERO).unwrap_err();
        match err {
            StateError::LockConflict { holder } => {
                assert_eq!(holder.id, guard.info().id);
                assert_eq!(holder.operation, "apply");
            }
            other => panic!("expected conflict, got {other}"),
        }

        guard.release().unwrap();
        assert!(store.lock_holder().unwrap().is_none());
        let again = store.lock("plan", Duration::ZERO).unwrap();
        again.release().unwrap();
    }

    #[test]
    fn acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let guard = store.lock("apply", Duration::ZERO).unwrap();

        let path = store.path().to_path_buf();
        let handle = std::thread::spawn(move || {
            let store = FileStateStore::new(path);
            store.lock("apply", Duration::from_secs(5)).unwrap()
        });
        std::thread::sleep(Duration::from_millis(50));
        guard.release().unwrap();

        let second = handle.join().unwrap();
        second.release().unwrap();
    }

    #[test]
    fn force_unlock_checks_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let guard = store.lock("apply", Duration::ZERO).unwrap();
        let id = guard.info().id.clone();
        // Simulate a crashed holder: forget the guard without releasing.
        std::mem::forget(guard);

        assert!(matches!(
            store.force_unlock("wrong-id"),
            Err(StateError::LockIdMismatch { .. })
        ));
        let holder = store.force_unlock(&id).unwrap();
        assert_eq!(holder.id, id);
        assert!(matches!(store.force_unlock(&id), Err(StateError::NotLocked)));
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        {
            let _guard = store.lock("apply", Duration::ZERO).unwrap();
        }
        assert!(store.lock_holder().unwrap().is_none());
    }
}
