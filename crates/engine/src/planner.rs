//! Plan construction
//!
//! Planning is pure with respect to owned resources: it reads (refresh,
//! data sources, secrets) but never creates, updates or deletes anything.
//! The produced change-set, applied in order, converges recorded state to
//! the document.

use crate::error::{EngineError, Result};
use crate::plan::{Action, DriftEntry, Plan, PlannedOp};
use crate::resolve::{DataArgResolver, PlanResolver};
use converge_document::{Address, Document, EvalContext, NodeKind, Resolved};
use converge_graph::DependencyGraph;
use converge_provider::{AttrMap, CachedSecrets, ProviderRegistry, SecretStore};
use converge_state::StateDocument;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Planning knobs
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Read live resources and fold drift into the baseline before diffing
    pub refresh: bool,
    /// Fail planning if any drift is found instead of folding it in
    pub strict_drift: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            refresh: true,
            strict_drift: false,
        }
    }
}

/// Diff the document against recorded state and produce a change-set
///
/// Resource operations come out in topological order; destroys of removed
/// resources follow, ordered so every record is destroyed before anything
/// it depended on.
pub fn plan(
    document: &Document,
    graph: &DependencyGraph,
    state: &StateDocument,
    registry: &ProviderRegistry,
    secrets: &dyn SecretStore,
    options: &PlanOptions,
) -> Result<Plan> {
    validate(document, registry)?;

    let mut plan = Plan::default();
    let baseline = refresh_baseline(state, registry, options, &mut plan.drift)?;
    if options.strict_drift && !plan.drift.is_empty() {
        let mut resources: Vec<Address> =
            plan.drift.iter().map(|d| d.address.clone()).collect();
        resources.dedup();
        return Err(EngineError::Drift { resources });
    }

    // One fetch per (name, version) for the whole cycle.
    let secrets = CachedSecrets::new(secrets);

    let order = graph.topo_order();
    evaluate_data(document, &order, &baseline, registry, &secrets, &mut plan)?;
    plan_resources(document, &order, &baseline, registry, &secrets, &mut plan)?;
    plan_destroys(document, &baseline, &mut plan)?;

    let summary = plan.summary();
    info!(
        "plan: {} to create, {} to update, {} to replace, {} to destroy, {} unchanged",
        summary.create, summary.update, summary.replace, summary.destroy, summary.unchanged
    );
    Ok(plan)
}

/// Schema and reference validation, before any read
fn validate(document: &Document, registry: &ProviderRegistry) -> Result<()> {
    let wrap = |address: &Address| {
        let address = address.clone();
        move |source| EngineError::Validation { address, source }
    };

    for node in &document.resources {
        let provider = registry
            .provider_for(&node.address.type_name)
            .map_err(wrap(&node.address))?;
        let schema = provider
            .schema(&node.address.type_name)
            .map_err(wrap(&node.address))?;
        schema
            .validate_keys(&node.address.type_name, node.attrs.keys())
            .map_err(wrap(&node.address))?;
        validate_refs(&node.references(), &node.address, registry)?;
    }
    for node in &document.data {
        registry
            .data_source_for(&node.address.type_name)
            .map_err(wrap(&node.address))?;
        validate_refs(&node.references(), &node.address, registry)?;
    }
    Ok(())
}

/// Every reference to a resource must name an attribute its schema declares
fn validate_refs(
    refs: &[converge_document::AttrRef],
    from: &Address,
    registry: &ProviderRegistry,
) -> Result<()> {
    for r in refs {
        if r.address.kind != NodeKind::Resource {
            continue;
        }
        let wrap = |source| EngineError::Validation {
            address: from.clone(),
            source,
        };
        let provider = registry.provider_for(&r.address.type_name).map_err(wrap)?;
        let schema = provider.schema(&r.address.type_name).map_err(wrap)?;
        if schema.attr(&r.attr).is_none() {
            return Err(wrap(converge_provider::ProviderError::InvalidArgument {
                resource_type: r.address.type_name.clone(),
                message: format!("reference {r} names an attribute the schema does not declare"),
            }));
        }
    }
    Ok(())
}

/// Read live resources and fold observed changes into a baseline copy
///
/// A record whose live resource is gone is dropped from the baseline, so
/// the diff plans a create if the node is still declared. Records for
/// nodes no longer declared are refreshed too; their destroys should act
/// on current identifiers.
fn refresh_baseline(
    state: &StateDocument,
    registry: &ProviderRegistry,
    options: &PlanOptions,
    drift: &mut Vec<DriftEntry>,
) -> Result<StateDocument> {
    let mut baseline = state.clone();
    if !options.refresh {
        return Ok(baseline);
    }

    let addresses: Vec<Address> = baseline.addresses().cloned().collect();
    for address in addresses {
        let record = baseline
            .get(&address)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("baseline lost {address}")))?;
        let provider = registry
            .provider_for(&address.type_name)
            .map_err(|source| EngineError::Refresh {
                address: address.clone(),
                source,
            })?;
        let live = provider
            .read(&address.type_name, &record.provider_id, &record.attrs)
            .map_err(|source| EngineError::Refresh {
                address: address.clone(),
                source,
            })?;
        match live {
            None => {
                warn!("{address}: no longer exists outside of this tool");
                drift.push(DriftEntry {
                    address: address.clone(),
                    detail: "resource no longer exists".to_string(),
                });
                baseline.remove(&address);
            }
            Some(realized) => {
                if realized.attrs != record.attrs {
                    let changed = changed_attrs(&record.attrs, &realized.attrs);
                    warn!("{address}: changed outside of this tool ({})", changed.join(", "));
                    drift.push(DriftEntry {
                        address: address.clone(),
                        detail: format!("attributes changed: {}", changed.join(", ")),
                    });
                }
                let mut updated = record;
                updated.provider_id = realized.provider_id;
                updated.attrs = realized.attrs;
                baseline.put(updated);
            }
        }
    }
    Ok(baseline)
}

fn changed_attrs(recorded: &AttrMap, live: &AttrMap) -> Vec<String> {
    let keys: BTreeSet<&String> = recorded.keys().chain(live.keys()).collect();
    keys.into_iter()
        .filter(|k| recorded.get(*k) != live.get(*k))
        .cloned()
        .collect()
}

/// Evaluate data nodes in dependency order
///
/// Data arguments may reference other data nodes and already-applied
/// resources (resolved from the refreshed baseline), never resources that
/// do not exist yet.
fn evaluate_data(
    document: &Document,
    order: &[Address],
    baseline: &StateDocument,
    registry: &ProviderRegistry,
    secrets: &dyn SecretStore,
    plan: &mut Plan,
) -> Result<()> {
    for address in order.iter().filter(|a| a.is_data()) {
        let node = document.data_node(address).ok_or_else(|| {
            EngineError::Internal(format!("graph contains undeclared node {address}"))
        })?;
        let resolver = DataArgResolver {
            data_values: &plan.data_values,
            baseline,
            secrets,
        };
        let ctx = EvalContext {
            base_dir: &document.dir,
            resolver: &resolver,
        };
        let mut args = AttrMap::new();
        for (attr, raw) in &node.attrs {
            match raw.eval(&ctx).map_err(|source| EngineError::Eval {
                address: address.clone(),
                attr: attr.clone(),
                source,
            })? {
                Resolved::Known(value) => {
                    args.insert(attr.clone(), value);
                }
                Resolved::Unknown => {
                    return Err(EngineError::Internal(format!(
                        "{address}.{attr} resolved to an unknown value at read time"
                    )));
                }
            }
        }
        let source = registry
            .data_source_for(&address.type_name)
            .map_err(|source| EngineError::Refresh {
                address: address.clone(),
                source,
            })?;
        debug!("reading {address}");
        let values = source
            .read(&address.type_name, &args)
            .map_err(|source| EngineError::Refresh {
                address: address.clone(),
                source,
            })?;
        plan.data_values.insert(address.clone(), values);
    }
    Ok(())
}

/// Resolve each declared resource and decide its action
fn plan_resources(
    document: &Document,
    order: &[Address],
    baseline: &StateDocument,
    registry: &ProviderRegistry,
    secrets: &dyn SecretStore,
    plan: &mut Plan,
) -> Result<()> {
    // Planned values per producer, filled as nodes are visited in
    // topological order. Attributes absent from a producer's map resolve
    // to Unknown.
    let mut planned: BTreeMap<Address, BTreeMap<String, Resolved>> = BTreeMap::new();

    for address in order.iter().filter(|a| a.is_resource()) {
        let node = document.resource(address).ok_or_else(|| {
            EngineError::Internal(format!("graph contains undeclared node {address}"))
        })?;
        let resolver = PlanResolver {
            data_values: &plan.data_values,
            planned: &planned,
            secrets,
        };
        let ctx = EvalContext {
            base_dir: &document.dir,
            resolver: &resolver,
        };
        let mut desired = BTreeMap::new();
        for (attr, raw) in &node.attrs {
            let value = raw.eval(&ctx).map_err(|source| EngineError::Eval {
                address: address.clone(),
                attr: attr.clone(),
                source,
            })?;
            desired.insert(attr.clone(), value);
        }

        let recorded = baseline.get(address).cloned();
        let action = match &recorded {
            None => Action::Create,
            Some(record) => {
                let changed: Vec<String> = desired
                    .iter()
                    .filter(|(attr, value)| match value {
                        Resolved::Unknown => true,
                        Resolved::Known(v) => record.attrs.get(*attr) != Some(v),
                    })
                    .map(|(attr, _)| attr.clone())
                    .collect();
                if changed.is_empty() {
                    Action::NoOp
                } else {
                    decide_change(node, registry, changed)?
                }
            }
        };

        // Values visible to downstream consumers at plan time.
        let values = match (&action, &recorded) {
            (Action::NoOp, Some(record)) => record
                .attrs
                .iter()
                .map(|(k, v)| (k.clone(), Resolved::Known(v.clone())))
                .collect(),
            _ => desired.clone(),
        };
        planned.insert(address.clone(), values);

        debug!("{address}: {}", action.verb());
        plan.ops.push(PlannedOp {
            address: address.clone(),
            action,
            desired,
            recorded,
            sensitive: node.sensitive.clone(),
        });
    }
    Ok(())
}

/// Update in place when every changed attribute is mutable, otherwise
/// replace; `prevent_destroy` blocks the replace path entirely
fn decide_change(
    node: &converge_document::ResourceNode,
    registry: &ProviderRegistry,
    changed: Vec<String>,
) -> Result<Action> {
    let address = &node.address;
    let wrap = |source| EngineError::Validation {
        address: address.clone(),
        source,
    };
    let provider = registry.provider_for(&address.type_name).map_err(wrap)?;
    let schema = provider.schema(&address.type_name).map_err(wrap)?;

    let forced_by: Vec<String> = changed
        .iter()
        .filter(|attr| !schema.is_mutable(attr))
        .cloned()
        .collect();
    if forced_by.is_empty() {
        return Ok(Action::Update { changed });
    }
    if node.lifecycle.prevent_destroy {
        return Err(EngineError::Protected {
            address: address.clone(),
            action: "replace",
        });
    }
    Ok(Action::Replace {
        forced_by,
        create_before_destroy: node.lifecycle.create_before_destroy,
    })
}

/// Plan destroys for recorded resources no longer declared
///
/// Ordered so a record is destroyed before every record it depends on;
/// ties break lexicographically. Dependencies outside the removed set are
/// declared nodes and are not destroyed at all.
fn plan_destroys(document: &Document, baseline: &StateDocument, plan: &mut Plan) -> Result<()> {
    let removed: BTreeSet<Address> = baseline
        .addresses()
        .filter(|a| !document.contains(a))
        .cloned()
        .collect();
    if removed.is_empty() {
        return Ok(());
    }

    for address in &removed {
        let record = baseline
            .get(address)
            .ok_or_else(|| EngineError::Internal(format!("baseline lost {address}")))?;
        if record.prevent_destroy {
            return Err(EngineError::Protected {
                address: address.clone(),
                action: "destroy",
            });
        }
    }

    let mut remaining = removed.clone();
    while !remaining.is_empty() {
        // Destroy records nothing else remaining depends on.
        let ready: Vec<Address> = remaining
            .iter()
            .filter(|candidate| {
                !remaining.iter().any(|other| {
                    other != *candidate
                        && baseline
                            .get(other)
                            .is_some_and(|r| r.depends_on.contains(candidate))
                })
            })
            .cloned()
            .collect();
        // Recorded dependencies are acyclic; a stall would be a state file
        // corrupted by hand. Fall back to address order to terminate.
        let batch = if ready.is_empty() {
            remaining.iter().cloned().collect()
        } else {
            ready
        };
        for address in batch {
            remaining.remove(&address);
            plan.ops.push(PlannedOp {
                address: address.clone(),
                action: Action::Destroy,
                desired: BTreeMap::new(),
                recorded: baseline.get(&address).cloned(),
                sensitive: BTreeSet::new(),
            });
        }
    }
    Ok(())
}
