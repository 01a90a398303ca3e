//! File-backed state store
//!
//! Saves are atomic: the document is written to a sibling temp file and
//! renamed over the target, so an interrupted run leaves either the old or
//! the new document, never a torn one. The executor saves after every
//! completed operation.

use crate::error::{Result, StateError};
use crate::lock::{LockGuard, LockInfo};
use crate::record::{StateDocument, STATE_VERSION};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Durable store for one state document
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map_or_else(
            || std::ffi::OsString::from("state"),
            std::ffi::OsStr::to_os_string,
        );
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Load the document; a missing file is an empty document
    pub fn load(&self) -> Result<StateDocument> {
        if !self.path.exists() {
            log::debug!("state file {} absent, starting empty", self.path.display());
            return Ok(StateDocument::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        let doc: StateDocument =
            serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        if doc.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: doc.version,
                supported: STATE_VERSION,
            });
        }
        Ok(doc)
    }

    /// Persist the document atomically, bumping its serial
    pub fn save(&self, doc: &mut StateDocument) -> Result<()> {
        doc.serial += 1;
        doc.last_updated = Utc::now();

        let content = serde_json::to_string_pretty(doc).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        log::debug!(
            "saved state serial {} to {}",
            doc.serial,
            self.path.display()
        );
        Ok(())
    }

    /// Acquire the exclusive writer lock
    ///
    /// Blocks (polling) up to `timeout`; a zero timeout fails fast. On
    /// conflict the error carries the holder's info so an operator can
    /// decide whether to force-unlock.
    pub fn lock(&self, operation: &str, timeout: Duration) -> Result<LockGuard> {
        LockGuard::acquire(self.lock_path(), operation, timeout)
    }

    /// Who currently holds the lock, if anyone
    pub fn lock_holder(&self) -> Result<Option<LockInfo>> {
        LockGuard::holder(&self.lock_path())
    }

    /// Remove an abandoned lock; `id` must match the held lock's id
    pub fn force_unlock(&self, id: &str) -> Result<LockInfo> {
        LockGuard::force_unlock(&self.lock_path(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StateRecord;
    use converge_document::Address;
    use std::collections::BTreeMap;

    fn store(dir: &tempfile::TempDir) -> FileStateStore {
        FileStateStore::new(dir.path().join("converge.state.json"))
    }

    fn record(name: &str) -> StateRecord {
        StateRecord {
            address: Address::resource("null", name),
            provider_id: name.to_string(),
            attrs: BTreeMap::new(),
            depends_on: Vec::new(),
            prevent_destroy: false,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let doc = store(&dir).load().unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.serial, 0);
    }

    #[test]
    fn save_bumps_serial_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut doc = StateDocument::default();
        doc.put(record("a"));

        store.save(&mut doc).unwrap();
        assert_eq!(doc.serial, 1);
        store.save(&mut doc).unwrap();
        assert_eq!(doc.serial, 2);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.serial, 2);
        assert!(loaded.contains(&Address::resource("null", "a")));
        // No temp file left behind
        assert!(!dir.path().join("converge.state.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let doc = serde_json::json!({
            "version": 99,
            "serial": 1,
            "resources": {},
            "last_updated": Utc::now(),
        });
        fs::write(store.path(), doc.to_string()).unwrap();
        assert!(matches!(
            store.load(),
            Err(StateError::UnsupportedVersion { found: 99, .. })
        ));
    }
}
