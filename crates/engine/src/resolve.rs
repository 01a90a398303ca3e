//! Reference resolution
//!
//! The same templates are evaluated twice with different resolvers: at
//! plan time against planned values (where attributes of not-yet-created
//! producers are `Unknown`), and at apply time against realized values.
//! Secret fetches go through the per-cycle cache in both phases.

use converge_document::{Address, AttrRef, EvalError, NodeKind, Resolved, Resolver};
use converge_provider::{AttrMap, SecretStore};
use converge_state::StateDocument;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

fn fetch_secret(
    secrets: &dyn SecretStore,
    name: &str,
    version: &str,
) -> Result<Value, EvalError> {
    secrets
        .fetch(name, version)
        .map_err(|e| EvalError::SecretFetch {
            name: name.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })
}

fn data_attr(
    data_values: &BTreeMap<Address, AttrMap>,
    attr: &AttrRef,
) -> Result<Resolved, EvalError> {
    let values = data_values.get(&attr.address).ok_or_else(|| {
        EvalError::UnresolvedRef(
            attr.to_string(),
            "data node has not been evaluated".to_string(),
        )
    })?;
    let value = values.get(&attr.attr).ok_or_else(|| {
        EvalError::UnresolvedRef(
            attr.to_string(),
            format!("data source returned no attribute `{}`", attr.attr),
        )
    })?;
    Ok(Resolved::Known(value.clone()))
}

/// Resolver for data node arguments
///
/// Data refs come from already-evaluated data nodes; resource refs resolve
/// from the recorded baseline; a resource never applied cannot be queried.
pub(crate) struct DataArgResolver<'a> {
    pub data_values: &'a BTreeMap<Address, AttrMap>,
    pub baseline: &'a StateDocument,
    pub secrets: &'a dyn SecretStore,
}

impl Resolver for DataArgResolver<'_> {
    fn resolve_attr(&self, attr: &AttrRef) -> Result<Resolved, EvalError> {
        match attr.address.kind {
            NodeKind::Data => data_attr(self.data_values, attr),
            NodeKind::Resource => {
                let record = self.baseline.get(&attr.address).ok_or_else(|| {
                    EvalError::UnresolvedRef(
                        attr.to_string(),
                        "resource has not been applied yet".to_string(),
                    )
                })?;
                record.attrs.get(&attr.attr).cloned().map_or_else(
                    || {
                        Err(EvalError::UnresolvedRef(
                            attr.to_string(),
                            format!("recorded state has no attribute `{}`", attr.attr),
                        ))
                    },
                    |v| Ok(Resolved::Known(v)),
                )
            }
        }
    }

    fn resolve_secret(&self, name: &str, version: &str) -> Result<Value, EvalError> {
        fetch_secret(self.secrets, name, version)
    }
}

/// Plan-time resolver for resource attributes
///
/// Producers are visited in topological order, so every referenced
/// resource already has a planned value map: per-attribute `Known` values
/// for unchanged or in-place-updated producers, `Unknown` for attributes
/// of producers that will be created or replaced.
pub(crate) struct PlanResolver<'a> {
    pub data_values: &'a BTreeMap<Address, AttrMap>,
    pub planned: &'a BTreeMap<Address, BTreeMap<String, Resolved>>,
    pub secrets: &'a dyn SecretStore,
}

impl Resolver for PlanResolver<'_> {
    fn resolve_attr(&self, attr: &AttrRef) -> Result<Resolved, EvalError> {
        match attr.address.kind {
            NodeKind::Data => data_attr(self.data_values, attr),
            NodeKind::Resource => {
                let values = self.planned.get(&attr.address).ok_or_else(|| {
                    EvalError::UnresolvedRef(
                        attr.to_string(),
                        "producer not planned before consumer".to_string(),
                    )
                })?;
                // Attributes absent from the planned map (computed outputs
                // of changing producers) are unknown until apply.
                Ok(values.get(&attr.attr).cloned().unwrap_or(Resolved::Unknown))
            }
        }
    }

    fn resolve_secret(&self, name: &str, version: &str) -> Result<Value, EvalError> {
        fetch_secret(self.secrets, name, version)
    }
}

/// Apply-time resolver: everything a node may reference has been realized
pub(crate) struct ApplyResolver<'a> {
    pub data_values: &'a BTreeMap<Address, AttrMap>,
    pub realized: &'a Mutex<BTreeMap<Address, AttrMap>>,
    pub secrets: &'a dyn SecretStore,
}

impl Resolver for ApplyResolver<'_> {
    fn resolve_attr(&self, attr: &AttrRef) -> Result<Resolved, EvalError> {
        match attr.address.kind {
            NodeKind::Data => data_attr(self.data_values, attr),
            NodeKind::Resource => {
                let realized = self.realized.lock().map_err(|_| {
                    EvalError::UnresolvedRef(attr.to_string(), "poisoned realized map".to_string())
                })?;
                let values = realized.get(&attr.address).ok_or_else(|| {
                    EvalError::UnresolvedRef(
                        attr.to_string(),
                        "producer has not been realized".to_string(),
                    )
                })?;
                values.get(&attr.attr).cloned().map_or_else(
                    || {
                        Err(EvalError::UnresolvedRef(
                            attr.to_string(),
                            format!("realized state has no attribute `{}`", attr.attr),
                        ))
                    },
                    |v| Ok(Resolved::Known(v)),
                )
            }
        }
    }

    fn resolve_secret(&self, name: &str, version: &str) -> Result<Value, EvalError> {
        fetch_secret(self.secrets, name, version)
    }
}
