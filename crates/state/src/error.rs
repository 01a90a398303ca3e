//! Error types for state persistence and locking

use crate::lock::LockInfo;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the state store
#[derive(Error, Debug)]
pub enum StateError {
    /// IO error reading or writing the state file
    #[error("state IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file is not valid JSON or has an unexpected shape
    #[error("corrupt state file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// State file was written by a newer, incompatible version
    #[error("unsupported state format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Another run holds the lock
    #[error(
        "state is locked by {} (pid {}, operation `{}`, acquired {})",
        .holder.id, .holder.pid, .holder.operation, .holder.acquired_at
    )]
    LockConflict { holder: LockInfo },

    /// Lock file exists but cannot be parsed; force-unlock to recover
    #[error("lock file {} is unreadable: {message}", .path.display())]
    LockCorrupt { path: PathBuf, message: String },

    /// Force-unlock was given the wrong lock id
    #[error("lock id mismatch: lock is held by {actual}, not {given}")]
    LockIdMismatch { given: String, actual: String },

    /// Unlock requested but no lock is held
    #[error("state is not locked")]
    NotLocked,
}

/// Result alias for state operations
pub type Result<T> = std::result::Result<T, StateError>;
