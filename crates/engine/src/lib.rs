//! # converge-engine
//!
//! The reconciliation core: diff a declaration document against recorded
//! state to produce an ordered change-set, then apply it through providers
//! in dependency order with bounded parallelism, retry on transient
//! failures, and incremental state persistence.
//!
//! Planning never mutates owned resources; applying never reorders across
//! dependencies. The caller is responsible for holding the state lock
//! around `plan` + `execute`.

pub mod error;
pub mod executor;
pub mod plan;
pub mod planner;
mod resolve;

pub use error::{EngineError, Result};
pub use executor::{
    execute, ExecuteOptions, NoProgress, ProgressCallback, RetryPolicy,
};
pub use plan::{
    Action, DriftEntry, ExecuteReport, ExecuteSummary, OpOutcome, Plan, PlanSummary, PlannedOp,
};
pub use planner::{plan, PlanOptions};

#[cfg(test)]
mod testfix;
