//! Change-set types
//!
//! A plan is the ordered list of operations transforming recorded state
//! into desired state: create, update, replace, destroy or no-op per node,
//! consistent with the dependency graph.

use converge_document::{Address, Resolved};
use converge_provider::AttrMap;
use converge_state::StateRecord;
use std::collections::{BTreeMap, BTreeSet};

/// What the executor will do to one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Not in state: create it
    Create,
    /// Mutable attributes changed: update in place
    Update { changed: Vec<String> },
    /// An immutable attribute changed: destroy and recreate
    Replace {
        /// Immutable attributes that forced the replace
        forced_by: Vec<String>,
        create_before_destroy: bool,
    },
    /// Removed from the document: destroy and forget
    Destroy,
    /// Recorded state already matches
    NoOp,
}

impl Action {
    /// Whether the action has provider-side effects
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }

    /// Verb for log and progress lines
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update { .. } => "update",
            Self::Replace { .. } => "replace",
            Self::Destroy => "destroy",
            Self::NoOp => "no-op",
        }
    }
}

/// One planned operation
#[derive(Debug, Clone)]
pub struct PlannedOp {
    pub address: Address,
    pub action: Action,
    /// Desired attribute values; `Unknown` where a referenced producer has
    /// not been created yet. Empty for destroys.
    pub desired: BTreeMap<String, Resolved>,
    /// The (refreshed) baseline record, if the node exists in state
    pub recorded: Option<StateRecord>,
    /// Attribute names to redact in output
    pub sensitive: BTreeSet<String>,
}

/// Divergence found between state records and live resources
#[derive(Debug, Clone)]
pub struct DriftEntry {
    pub address: Address,
    pub detail: String,
}

/// An ordered change-set
///
/// Creates/updates/no-ops come first in topological order; destroys follow
/// in reverse recorded-dependency order, so nothing is destroyed before
/// its dependents.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub ops: Vec<PlannedOp>,
    pub drift: Vec<DriftEntry>,
    /// Data node results for this cycle, reused by the executor
    pub data_values: BTreeMap<Address, AttrMap>,
}

impl Plan {
    pub fn op(&self, address: &Address) -> Option<&PlannedOp> {
        self.ops.iter().find(|op| &op.address == address)
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for op in &self.ops {
            match &op.action {
                Action::Create => summary.create += 1,
                Action::Update { .. } => summary.update += 1,
                Action::Replace { .. } => summary.replace += 1,
                Action::Destroy => summary.destroy += 1,
                Action::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        self.ops.iter().any(|op| op.action.is_change())
    }
}

/// Counts per action kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub destroy: usize,
    pub unchanged: usize,
}

impl PlanSummary {
    pub fn total_changes(&self) -> usize {
        self.create + self.update + self.replace + self.destroy
    }
}

/// Result of applying one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Created,
    Updated,
    Replaced,
    Destroyed,
    /// Already converged; nothing done
    Unchanged,
    Failed { error: String },
    /// Not attempted: dependency failed, run cancelled, or dry run
    Skipped { reason: String },
}

impl OpOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }

    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Updated | Self::Replaced | Self::Destroyed
        )
    }
}

/// Aggregated execution results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub destroyed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExecuteSummary {
    pub fn add_outcome(&mut self, outcome: &OpOutcome) {
        match outcome {
            OpOutcome::Created => self.created += 1,
            OpOutcome::Updated => self.updated += 1,
            OpOutcome::Replaced => self.replaced += 1,
            OpOutcome::Destroyed => self.destroyed += 1,
            OpOutcome::Unchanged => self.unchanged += 1,
            OpOutcome::Failed { .. } => self.failed += 1,
            OpOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Total number of provider-side changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.destroyed
    }

    pub fn total(&self) -> usize {
        self.total_changes() + self.unchanged + self.failed + self.skipped
    }

    /// A run succeeds only if no node failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Per-node outcomes plus the aggregate, in plan order
#[derive(Debug, Clone, Default)]
pub struct ExecuteReport {
    pub outcomes: Vec<(Address, OpOutcome)>,
    pub summary: ExecuteSummary,
}

impl ExecuteReport {
    pub fn outcome(&self, address: &Address) -> Option<&OpOutcome> {
        self.outcomes
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, o)| o)
    }

    pub fn record(&mut self, address: Address, outcome: OpOutcome) {
        self.summary.add_outcome(&outcome);
        self.outcomes.push((address, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_outcomes() {
        let mut report = ExecuteReport::default();
        report.record(Address::resource("null", "a"), OpOutcome::Created);
        report.record(Address::resource("null", "b"), OpOutcome::Unchanged);
        report.record(
            Address::resource("null", "c"),
            OpOutcome::Failed { error: "boom".into() },
        );
        assert_eq!(report.summary.total(), 3);
        assert_eq!(report.summary.total_changes(), 1);
        assert!(!report.summary.is_success());
    }

    #[test]
    fn action_verbs() {
        assert_eq!(Action::Create.verb(), "create");
        assert!(Action::Create.is_change());
        assert!(!Action::NoOp.is_change());
    }
}
