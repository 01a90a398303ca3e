//! Declaration nodes
//!
//! A parsed document is a set of resource nodes (owned, reconciled through
//! a provider) and data nodes (read-only queries). Attribute values are
//! kept in raw form: literals, parsed templates, and nested containers.

use crate::address::{Address, AttrRef};
use crate::error::EvalError;
use crate::expr::{EvalContext, Template};
use crate::value::Resolved;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// An attribute value before evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Non-string scalar, taken as-is
    Literal(Value),
    /// String value, parsed as a template
    Template(Template),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// Collect every attribute reference appearing in this value
    pub fn collect_refs(&self, out: &mut Vec<AttrRef>) {
        match self {
            Self::Literal(_) => {}
            Self::Template(t) => t.collect_refs(out),
            Self::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Self::Map(map) => map.values().for_each(|v| v.collect_refs(out)),
        }
    }

    /// Whether any nested template fetches a secret
    pub fn uses_secret(&self) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Template(t) => t.uses_secret(),
            Self::List(items) => items.iter().any(Self::uses_secret),
            Self::Map(map) => map.values().any(Self::uses_secret),
        }
    }

    /// Evaluate to a concrete value; an unknown anywhere inside a container
    /// makes the whole attribute unknown
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<Resolved, EvalError> {
        match self {
            Self::Literal(v) => Ok(Resolved::Known(v.clone())),
            Self::Template(t) => t.eval(ctx),
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.eval(ctx)? {
                        Resolved::Unknown => return Ok(Resolved::Unknown),
                        Resolved::Known(v) => out.push(v),
                    }
                }
                Ok(Resolved::Known(Value::Array(out)))
            }
            Self::Map(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    match v.eval(ctx)? {
                        Resolved::Unknown => return Ok(Resolved::Unknown),
                        Resolved::Known(v) => {
                            out.insert(k.clone(), v);
                        }
                    }
                }
                Ok(Resolved::Known(Value::Object(out)))
            }
        }
    }
}

/// Per-node lifecycle policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    /// Planning fails rather than destroy or replace this resource
    pub prevent_destroy: bool,
    /// On replace, create the successor before destroying the predecessor
    pub create_before_destroy: bool,
}

/// A declared resource
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub address: Address,
    pub attrs: BTreeMap<String, RawValue>,
    /// Explicit ordering constraints, kept distinct from reference edges
    pub depends_on: Vec<Address>,
    pub lifecycle: Lifecycle,
    /// Attributes whose templates fetch secrets; redacted in plan output
    pub sensitive: BTreeSet<String>,
}

/// A declared read-only query
#[derive(Debug, Clone)]
pub struct DataNode {
    pub address: Address,
    pub attrs: BTreeMap<String, RawValue>,
    pub depends_on: Vec<Address>,
}

impl ResourceNode {
    /// All references made by this node's attributes
    pub fn references(&self) -> Vec<AttrRef> {
        let mut refs = Vec::new();
        for value in self.attrs.values() {
            value.collect_refs(&mut refs);
        }
        refs
    }
}

impl DataNode {
    pub fn references(&self) -> Vec<AttrRef> {
        let mut refs = Vec::new();
        for value in self.attrs.values() {
            value.collect_refs(&mut refs);
        }
        refs
    }
}

/// A fully parsed declaration document
#[derive(Debug, Clone)]
pub struct Document {
    /// Directory the document was loaded from; `file()` resolves here
    pub dir: PathBuf,
    pub resources: Vec<ResourceNode>,
    pub data: Vec<DataNode>,
}

impl Document {
    /// An empty document rooted at `dir` (used by `destroy`)
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            resources: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn resource(&self, address: &Address) -> Option<&ResourceNode> {
        self.resources.iter().find(|r| &r.address == address)
    }

    pub fn data_node(&self, address: &Address) -> Option<&DataNode> {
        self.data.iter().find(|d| &d.address == address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        match address.kind {
            crate::address::NodeKind::Resource => self.resource(address).is_some(),
            crate::address::NodeKind::Data => self.data_node(address).is_some(),
        }
    }

    /// All node addresses, resources first, in declaration order
    pub fn addresses(&self) -> Vec<Address> {
        self.resources
            .iter()
            .map(|r| r.address.clone())
            .chain(self.data.iter().map(|d| d.address.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.data.is_empty()
    }
}
