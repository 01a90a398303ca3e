//! Error types for graph construction

use thiserror::Error;

/// Errors detected while building the dependency graph
///
/// Either failure aborts planning entirely; a document that does not form
/// a DAG never produces a partial plan.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A reference or `depends_on` entry names a node that is not declared
    #[error("{from} references undeclared node {target}")]
    UnresolvedReference { from: String, target: String },

    /// The reference/ordering graph contains a cycle
    #[error("dependency cycle between: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },
}

/// Result alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
