//! # converge-graph
//!
//! Builds the dependency DAG over a declaration document. Edges come from
//! two sources and are kept distinct:
//!
//! - **Reference edges**: inferred from attribute expressions; the producer
//!   must be realized before the consumer is evaluated.
//! - **Ordering edges**: declared `depends_on` constraints with no data
//!   dependency, for side effects invisible to the attribute graph.
//!
//! Construction fails on unresolved references and on cycles (naming every
//! participating node). Topological order is deterministic: among
//! simultaneously-ready nodes, lexicographic address order.

pub mod error;

pub use error::{GraphError, Result};

use converge_document::{Address, Document};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Why an edge exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Consumer's attributes reference the producer's outputs
    Reference,
    /// Explicit `depends_on` constraint
    Ordering,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("ref"),
            Self::Ordering => f.write_str("depends_on"),
        }
    }
}

/// The dependency DAG over a document's nodes
///
/// Edges point from producer to consumer: a topological order is a valid
/// execution order.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<Address, EdgeKind>,
    index: BTreeMap<Address, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph for a document, or fail without partial results
    pub fn build(document: &Document) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();

        for address in document.addresses() {
            let idx = graph.add_node(address.clone());
            index.insert(address, idx);
        }

        let mut edges: BTreeSet<(Address, Address, bool)> = BTreeSet::new();
        for resource in &document.resources {
            for attr_ref in resource.references() {
                edges.insert((attr_ref.address, resource.address.clone(), true));
            }
            for dep in &resource.depends_on {
                edges.insert((dep.clone(), resource.address.clone(), false));
            }
        }
        for data in &document.data {
            for attr_ref in data.references() {
                edges.insert((attr_ref.address, data.address.clone(), true));
            }
            for dep in &data.depends_on {
                edges.insert((dep.clone(), data.address.clone(), false));
            }
        }

        for (producer, consumer, is_ref) in edges {
            let Some(&from) = index.get(&producer) else {
                return Err(GraphError::UnresolvedReference {
                    from: consumer.to_string(),
                    target: producer.to_string(),
                });
            };
            let to = index[&consumer];
            let kind = if is_ref {
                EdgeKind::Reference
            } else {
                EdgeKind::Ordering
            };
            graph.add_edge(from, to, kind);
        }

        let built = Self { graph, index };
        built.check_acyclic()?;
        Ok(built)
    }

    /// Reject cycles, listing every participating node
    fn check_acyclic(&self) -> Result<()> {
        for component in tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.graph.find_edge(n, n).is_some());
            if is_cycle {
                let mut nodes: Vec<String> = component
                    .iter()
                    .map(|&n| self.graph[n].to_string())
                    .collect();
                nodes.sort();
                return Err(GraphError::Cycle { nodes });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    /// Direct dependencies (producers) of a node, sorted
    pub fn dependencies_of(&self, address: &Address) -> Vec<Address> {
        self.neighbors(address, Direction::Incoming)
    }

    /// Direct dependents (consumers) of a node, sorted
    pub fn dependents_of(&self, address: &Address) -> Vec<Address> {
        self.neighbors(address, Direction::Outgoing)
    }

    fn neighbors(&self, address: &Address, dir: Direction) -> Vec<Address> {
        let Some(&idx) = self.index.get(address) else {
            return Vec::new();
        };
        let set: BTreeSet<Address> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].clone())
            .collect();
        set.into_iter().collect()
    }

    /// Deterministic topological order: ready nodes are emitted in
    /// lexicographic address order
    pub fn topo_order(&self) -> Vec<Address> {
        self.waves().into_iter().flatten().collect()
    }

    /// Group nodes into execution waves: every node's dependencies are in
    /// strictly earlier waves, so nodes within a wave are mutually
    /// independent and may run in parallel
    pub fn waves(&self) -> Vec<Vec<Address>> {
        let mut indegree: BTreeMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| {
                (
                    n,
                    self.graph.neighbors_directed(n, Direction::Incoming).count(),
                )
            })
            .collect();

        let mut waves = Vec::new();
        let mut remaining = self.graph.node_count();
        while remaining > 0 {
            let mut ready: Vec<NodeIndex> = indegree
                .iter()
                .filter(|&(_, &d)| d == 0)
                .map(|(&n, _)| n)
                .collect();
            // Build is cycle-checked, so `ready` is never empty here.
            ready.sort_by(|&a, &b| self.graph[a].cmp(&self.graph[b]));

            for &node in &ready {
                indegree.remove(&node);
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    if let Some(d) = indegree.get_mut(&succ) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
            remaining -= ready.len();
            waves.push(ready.into_iter().map(|n| self.graph[n].clone()).collect());
        }
        waves
    }

    /// Render the graph in Graphviz DOT format
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_document::Document;
    use std::collections::BTreeSet;
    use std::path::Path;

    fn doc(content: &str) -> Document {
        let mut document = Document::empty(".");
        let mut seen = BTreeSet::new();
        converge_document::loader::load_str(content, Path::new("test.toml"), &mut document, &mut seen)
            .unwrap();
        document
    }

    const CHAIN: &str = r#"
        [resource.null.a]

        [resource.null.b]
        triggers = { upstream = "${resource.null.a.id}" }

        [resource.null.c]
        depends_on = ["resource.null.b"]

        [resource.null.loner]
    "#;

    #[test]
    fn builds_reference_and_ordering_edges() {
        let graph = DependencyGraph::build(&doc(CHAIN)).unwrap();
        assert_eq!(graph.len(), 4);
        let b = Address::resource("null", "b");
        assert_eq!(graph.dependencies_of(&b), vec![Address::resource("null", "a")]);
        assert_eq!(graph.dependents_of(&b), vec![Address::resource("null", "c")]);
    }

    #[test]
    fn topo_order_satisfies_every_edge() {
        let graph = DependencyGraph::build(&doc(CHAIN)).unwrap();
        let order = graph.topo_order();
        let pos = |name: &str| {
            order
                .iter()
                .position(|a| a.name == name)
                .unwrap()
        };
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn waves_group_independent_nodes() {
        let graph = DependencyGraph::build(&doc(CHAIN)).unwrap();
        let waves = graph.waves();
        assert_eq!(waves.len(), 3);
        // a and the loner are mutually independent
        assert_eq!(waves[0].len(), 2);
        assert_eq!(waves[1], vec![Address::resource("null", "b")]);
        assert_eq!(waves[2], vec![Address::resource("null", "c")]);
    }

    #[test]
    fn unresolved_reference_names_both_nodes() {
        let err = DependencyGraph::build(&doc(
            r#"
            [resource.null.a]
            triggers = { x = "${resource.null.ghost.id}" }
            "#,
        ))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("resource.null.a"));
        assert!(msg.contains("resource.null.ghost"));
    }

    #[test]
    fn two_node_cycle_names_participants() {
        let err = DependencyGraph::build(&doc(
            r#"
            [resource.null.a]
            triggers = { x = "${resource.null.b.id}" }

            [resource.null.b]
            triggers = { x = "${resource.null.a.id}" }
            "#,
        ))
        .unwrap_err();
        match err {
            GraphError::Cycle { nodes } => {
                assert_eq!(
                    nodes,
                    vec!["resource.null.a".to_string(), "resource.null.b".to_string()]
                );
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = DependencyGraph::build(&doc(
            r#"
            [resource.null.a]
            triggers = { x = "${resource.null.a.id}" }
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn depends_on_cycle_detected_across_edge_kinds() {
        let err = DependencyGraph::build(&doc(
            r#"
            [resource.null.a]
            depends_on = ["resource.null.b"]

            [resource.null.b]
            triggers = { x = "${resource.null.a.id}" }
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn data_nodes_participate() {
        let graph = DependencyGraph::build(&doc(
            r#"
            [data.env.user]
            name = "USER"

            [resource.null.a]
            triggers = { who = "${data.env.user.value}" }
            "#,
        ))
        .unwrap();
        let a = Address::resource("null", "a");
        assert_eq!(graph.dependencies_of(&a), vec![Address::data("env", "user")]);
    }
}
