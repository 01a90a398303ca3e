//! # converge-state
//!
//! Durable persistence of last-applied resource state: the diff baseline
//! for planning, and the source of truth for attribute values referenced
//! by other nodes.
//!
//! Two invariants hold at all times:
//!
//! - Saves are atomic; an interrupted apply leaves state consistent with
//!   exactly the operations that completed.
//! - At most one writer: the executor holds an exclusive file lock for the
//!   duration of a run, and abandoned locks are recoverable by id.

pub mod error;
pub mod lock;
pub mod record;
pub mod store;

pub use error::{Result, StateError};
pub use lock::{LockGuard, LockInfo};
pub use record::{StateDocument, StateRecord, STATE_VERSION};
pub use store::FileStateStore;
