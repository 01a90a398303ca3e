//! Engine error taxonomy
//!
//! Parse, reference and validation errors abort before any side effect.
//! Provider errors during execution are scoped to one operation and its
//! dependents and surface in the execute report, not here.

use converge_document::{Address, EvalError, ParseError};
use converge_graph::GraphError;
use converge_provider::ProviderError;
use converge_state::StateError;
use thiserror::Error;

/// Errors that abort a plan or apply run as a whole
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    State(#[from] StateError),

    /// A declaration failed provider schema validation
    #[error("{address}: {source}")]
    Validation {
        address: Address,
        #[source]
        source: ProviderError,
    },

    /// A template could not be evaluated
    #[error("{address}.{attr}: {source}")]
    Eval {
        address: Address,
        attr: String,
        #[source]
        source: EvalError,
    },

    /// Refreshing a recorded resource failed
    #[error("refreshing {address}: {source}")]
    Refresh {
        address: Address,
        #[source]
        source: ProviderError,
    },

    /// Observed state diverged from the record and strict drift checking
    /// is on; reconcile (re-plan without strict mode) before applying
    #[error("drift detected on: {}", format_addresses(.resources))]
    Drift { resources: Vec<Address> },

    /// A `prevent_destroy` resource would be destroyed or replaced
    #[error("{address} is protected by prevent_destroy and cannot be {action}d")]
    Protected {
        address: Address,
        action: &'static str,
    },

    /// Invariant violation inside the engine
    #[error("internal engine error: {0}")]
    Internal(String),
}

fn format_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
