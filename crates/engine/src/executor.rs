//! Plan execution
//!
//! Operations run in waves: each wave holds nodes whose dependencies all
//! completed in earlier waves, and runs on a rayon pool bounded by the
//! configured job count. State is persisted after every successful
//! operation, so an interrupted run resumes where it stopped. A failed
//! operation marks its transitive dependents skipped; independent branches
//! keep going.
//!
//! The caller holds the state lock for the whole apply.

use crate::error::{EngineError, Result};
use crate::plan::{Action, ExecuteReport, OpOutcome, Plan, PlannedOp};
use crate::resolve::ApplyResolver;
use chrono::Utc;
use converge_document::{Address, Document, EvalContext, Resolved};
use converge_graph::DependencyGraph;
use converge_provider::{AttrMap, CachedSecrets, ProviderRegistry, Realized, SecretStore};
use converge_state::{FileStateStore, StateDocument, StateRecord};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Backoff policy for transient provider failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First retry delay; doubles on each subsequent retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Execution knobs
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Worker pool size; independent operations in a wave run in parallel
    pub jobs: usize,
    /// Walk the plan without touching providers or state
    pub dry_run: bool,
    pub retry: RetryPolicy,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            dry_run: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Execution progress hooks, called from worker threads
pub trait ProgressCallback: Send + Sync {
    fn op_started(&self, address: &Address, action: &Action);
    fn op_finished(&self, address: &Address, outcome: &OpOutcome);
}

/// No-op progress sink
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn op_started(&self, _address: &Address, _action: &Action) {}
    fn op_finished(&self, _address: &Address, _outcome: &OpOutcome) {}
}

/// Apply a plan, persisting state incrementally
///
/// The report lists every planned operation in plan order. Returns an
/// error only for run-level failures (state persistence, pool setup);
/// per-operation provider failures surface as `Failed` outcomes.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    plan: &Plan,
    document: &Document,
    graph: &DependencyGraph,
    registry: &ProviderRegistry,
    secrets: &dyn SecretStore,
    store: &FileStateStore,
    state: &mut StateDocument,
    options: &ExecuteOptions,
    progress: &dyn ProgressCallback,
    cancel: &AtomicBool,
) -> Result<ExecuteReport> {
    if options.dry_run {
        return Ok(dry_run_report(plan));
    }

    let secrets = CachedSecrets::new(secrets);
    let mut outcomes: BTreeMap<Address, OpOutcome> = BTreeMap::new();
    let realized: Mutex<BTreeMap<Address, AttrMap>> = Mutex::new(BTreeMap::new());

    // Unchanged nodes are visible to consumers from their recorded values.
    for op in &plan.ops {
        if let (Action::NoOp, Some(record)) = (&op.action, &op.recorded) {
            lock(&realized)?.insert(op.address.clone(), record.attrs.clone());
            outcomes.insert(op.address.clone(), OpOutcome::Unchanged);
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .build()
        .map_err(|e| EngineError::Internal(format!("failed to build worker pool: {e}")))?;

    let state_mu = Mutex::new(state);
    let env = WorkerEnv {
        plan,
        document,
        graph,
        registry,
        secrets: &secrets,
        store,
        state: &state_mu,
        realized: &realized,
        options,
        progress,
        cancel,
    };

    for wave in graph.waves() {
        let batch: Vec<&PlannedOp> = wave
            .iter()
            .filter_map(|address| plan.op(address))
            .filter(|op| op.action.is_change())
            .collect();
        if batch.is_empty() {
            continue;
        }
        let results: Vec<(Address, Result<OpOutcome>)> = pool.install(|| {
            batch
                .into_par_iter()
                .map(|op| (op.address.clone(), run_op(&env, op, &outcomes)))
                .collect()
        });
        let mut first_err = None;
        for (address, result) in results {
            match result {
                Ok(outcome) => {
                    outcomes.insert(address, outcome);
                }
                Err(e) => first_err = first_err.or(Some(e)),
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
    }

    run_destroys(&env, &mut outcomes)?;

    let mut report = ExecuteReport::default();
    for op in &plan.ops {
        let outcome = outcomes
            .remove(&op.address)
            .unwrap_or_else(|| OpOutcome::Skipped {
                reason: "not reached".to_string(),
            });
        report.record(op.address.clone(), outcome);
    }
    info!(
        "apply: {} changed, {} unchanged, {} failed, {} skipped",
        report.summary.total_changes(),
        report.summary.unchanged,
        report.summary.failed,
        report.summary.skipped
    );
    Ok(report)
}

fn dry_run_report(plan: &Plan) -> ExecuteReport {
    let mut report = ExecuteReport::default();
    for op in &plan.ops {
        let outcome = if op.action.is_change() {
            OpOutcome::Skipped {
                reason: "dry run".to_string(),
            }
        } else {
            OpOutcome::Unchanged
        };
        report.record(op.address.clone(), outcome);
    }
    report
}

/// Everything a worker needs, shared across the pool
struct WorkerEnv<'a> {
    plan: &'a Plan,
    document: &'a Document,
    graph: &'a DependencyGraph,
    registry: &'a ProviderRegistry,
    secrets: &'a dyn SecretStore,
    store: &'a FileStateStore,
    state: &'a Mutex<&'a mut StateDocument>,
    realized: &'a Mutex<BTreeMap<Address, AttrMap>>,
    options: &'a ExecuteOptions,
    progress: &'a dyn ProgressCallback,
    cancel: &'a AtomicBool,
}

fn lock<T>(mu: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mu.lock()
        .map_err(|_| EngineError::Internal("executor mutex poisoned".to_string()))
}

/// Run one create/update/replace operation
///
/// Returns `Err` only when state cannot be persisted; provider failures
/// become `Failed` outcomes scoped to this node.
fn run_op(
    env: &WorkerEnv<'_>,
    op: &PlannedOp,
    outcomes: &BTreeMap<Address, OpOutcome>,
) -> Result<OpOutcome> {
    if env.cancel.load(Ordering::Relaxed) {
        let outcome = OpOutcome::Skipped {
            reason: "run cancelled".to_string(),
        };
        env.progress.op_finished(&op.address, &outcome);
        return Ok(outcome);
    }
    if let Some(outcome) = blocked_by_dependency(env, &op.address, outcomes) {
        env.progress.op_finished(&op.address, &outcome);
        return Ok(outcome);
    }

    env.progress.op_started(&op.address, &op.action);
    let outcome = match apply_change(env, op) {
        Ok(outcome) => outcome,
        Err(ApplyFailure::Op(message)) => {
            warn!("{}: {message}", op.address);
            OpOutcome::Failed { error: message }
        }
        Err(ApplyFailure::Run(e)) => return Err(e),
    };
    env.progress.op_finished(&op.address, &outcome);
    Ok(outcome)
}

/// A dependency that failed or was skipped blocks this node
fn blocked_by_dependency(
    env: &WorkerEnv<'_>,
    address: &Address,
    outcomes: &BTreeMap<Address, OpOutcome>,
) -> Option<OpOutcome> {
    for dep in env.graph.dependencies_of(address) {
        match outcomes.get(&dep) {
            Some(OpOutcome::Failed { .. }) => {
                return Some(OpOutcome::Skipped {
                    reason: format!("dependency {dep} failed"),
                });
            }
            Some(OpOutcome::Skipped { .. }) => {
                return Some(OpOutcome::Skipped {
                    reason: format!("dependency {dep} was skipped"),
                });
            }
            _ => {}
        }
    }
    None
}

/// Failure scope: one operation, or the whole run
enum ApplyFailure {
    Op(String),
    Run(EngineError),
}

impl From<EngineError> for ApplyFailure {
    fn from(e: EngineError) -> Self {
        Self::Run(e)
    }
}

fn apply_change(env: &WorkerEnv<'_>, op: &PlannedOp) -> std::result::Result<OpOutcome, ApplyFailure> {
    let address = &op.address;
    let provider = env
        .registry
        .provider_for(&address.type_name)
        .map_err(|e| ApplyFailure::Op(e.to_string()))?;

    match &op.action {
        Action::Create => {
            let attrs = resolve_attrs(env, op)?;
            let realized = dispatch(env, address, "create", || {
                provider.create(&address.type_name, &attrs)
            })?;
            persist(env, op, realized, None)?;
            Ok(OpOutcome::Created)
        }
        Action::Update { changed } => {
            debug!("{address}: updating {}", changed.join(", "));
            let attrs = resolve_attrs(env, op)?;
            let prior = op
                .recorded
                .as_ref()
                .ok_or_else(|| ApplyFailure::Run(missing_record(address)))?;
            let realized = dispatch(env, address, "update", || {
                provider.update(&address.type_name, &prior.provider_id, &attrs)
            })?;
            persist(env, op, realized, Some(prior.created_at))?;
            Ok(OpOutcome::Updated)
        }
        Action::Replace {
            create_before_destroy,
            ..
        } => {
            let attrs = resolve_attrs(env, op)?;
            let prior = op
                .recorded
                .as_ref()
                .ok_or_else(|| ApplyFailure::Run(missing_record(address)))?;
            if *create_before_destroy {
                let realized = dispatch(env, address, "create", || {
                    provider.create(&address.type_name, &attrs)
                })?;
                persist(env, op, realized, None)?;
                dispatch(env, address, "delete", || {
                    provider.delete(&address.type_name, &prior.provider_id)
                })
                .map_err(|e| match e {
                    // The successor exists and is recorded; only the
                    // predecessor is left behind.
                    ApplyFailure::Op(m) => {
                        ApplyFailure::Op(format!("replacement created but predecessor removal failed: {m}"))
                    }
                    run => run,
                })?;
            } else {
                dispatch(env, address, "delete", || {
                    provider.delete(&address.type_name, &prior.provider_id)
                })?;
                forget(env, address)?;
                let realized = dispatch(env, address, "create", || {
                    provider.create(&address.type_name, &attrs)
                })?;
                persist(env, op, realized, None)?;
            }
            Ok(OpOutcome::Replaced)
        }
        Action::Destroy => {
            let prior = op
                .recorded
                .as_ref()
                .ok_or_else(|| ApplyFailure::Run(missing_record(address)))?;
            dispatch(env, address, "delete", || {
                provider.delete(&address.type_name, &prior.provider_id)
            })?;
            forget(env, address)?;
            Ok(OpOutcome::Destroyed)
        }
        Action::NoOp => Ok(OpOutcome::Unchanged),
    }
}

fn missing_record(address: &Address) -> EngineError {
    EngineError::Internal(format!("{address}: planned against a missing state record"))
}

/// Re-evaluate the node's attributes against realized producer values
///
/// Values known at plan time evaluate identically; values planned as
/// unknown now resolve from what upstream operations actually produced.
fn resolve_attrs(
    env: &WorkerEnv<'_>,
    op: &PlannedOp,
) -> std::result::Result<AttrMap, ApplyFailure> {
    let node = env
        .document
        .resource(&op.address)
        .ok_or_else(|| ApplyFailure::Run(EngineError::Internal(format!(
            "{}: operation has no declaration",
            op.address
        ))))?;
    let resolver = ApplyResolver {
        data_values: &env.plan.data_values,
        realized: env.realized,
        secrets: env.secrets,
    };
    let ctx = EvalContext {
        base_dir: &env.document.dir,
        resolver: &resolver,
    };
    let mut attrs = AttrMap::new();
    for (attr, raw) in &node.attrs {
        match raw
            .eval(&ctx)
            .map_err(|e| ApplyFailure::Op(format!("{attr}: {e}")))?
        {
            Resolved::Known(value) => {
                attrs.insert(attr.clone(), value);
            }
            Resolved::Unknown => {
                return Err(ApplyFailure::Op(format!(
                    "{attr}: still unknown after dependencies were applied"
                )));
            }
        }
    }
    Ok(attrs)
}

/// Call the provider with retry on transient failures
fn dispatch<T>(
    env: &WorkerEnv<'_>,
    address: &Address,
    verb: &str,
    f: impl Fn() -> converge_provider::Result<T>,
) -> std::result::Result<T, ApplyFailure> {
    with_retry(&env.options.retry, &format!("{verb} {address}"), f)
        .map_err(|e| ApplyFailure::Op(e.to_string()))
}

pub(crate) fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    f: impl Fn() -> converge_provider::Result<T>,
) -> converge_provider::Result<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                warn!(
                    "{what}: {e}; retrying in {delay:?} ({attempt}/{})",
                    policy.max_retries
                );
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Record a realized resource and persist state
fn persist(
    env: &WorkerEnv<'_>,
    op: &PlannedOp,
    realized: Realized,
    created_at: Option<chrono::DateTime<Utc>>,
) -> std::result::Result<(), ApplyFailure> {
    let node = env
        .document
        .resource(&op.address)
        .ok_or_else(|| ApplyFailure::Run(EngineError::Internal(format!(
            "{}: operation has no declaration",
            op.address
        ))))?;
    let now = Utc::now();
    let record = StateRecord {
        address: op.address.clone(),
        provider_id: realized.provider_id,
        attrs: realized.attrs.clone(),
        depends_on: env
            .graph
            .dependencies_of(&op.address)
            .into_iter()
            .filter(Address::is_resource)
            .collect(),
        prevent_destroy: node.lifecycle.prevent_destroy,
        created_at: created_at.unwrap_or(now),
        modified_at: now,
    };

    lock(env.realized)?.insert(op.address.clone(), realized.attrs);
    let mut state = lock(env.state)?;
    state.put(record);
    env.store.save(&mut state).map_err(EngineError::from)?;
    Ok(())
}

/// Drop a record from state and persist
fn forget(env: &WorkerEnv<'_>, address: &Address) -> std::result::Result<(), ApplyFailure> {
    let mut state = lock(env.state)?;
    state.remove(address);
    env.store.save(&mut state).map_err(EngineError::from)?;
    Ok(())
}

/// Destroys run after all graph waves, sequentially in plan order
///
/// Plan order already puts dependents before their dependencies; a failed
/// destroy keeps everything it depended on alive.
fn run_destroys(env: &WorkerEnv<'_>, outcomes: &mut BTreeMap<Address, OpOutcome>) -> Result<()> {
    let destroys: Vec<&PlannedOp> = env
        .plan
        .ops
        .iter()
        .filter(|op| matches!(op.action, Action::Destroy))
        .collect();

    for op in &destroys {
        if env.cancel.load(Ordering::Relaxed) {
            outcomes.insert(
                op.address.clone(),
                OpOutcome::Skipped {
                    reason: "run cancelled".to_string(),
                },
            );
            continue;
        }
        // A record stays if a removed dependent could not be destroyed.
        let blocked = destroys.iter().find(|other| {
            other
                .recorded
                .as_ref()
                .is_some_and(|r| r.depends_on.contains(&op.address))
                && matches!(
                    outcomes.get(&other.address),
                    Some(OpOutcome::Failed { .. } | OpOutcome::Skipped { .. })
                )
        });
        if let Some(other) = blocked {
            let outcome = OpOutcome::Skipped {
                reason: format!("dependent {} was not destroyed", other.address),
            };
            env.progress.op_finished(&op.address, &outcome);
            outcomes.insert(op.address.clone(), outcome);
            continue;
        }

        env.progress.op_started(&op.address, &op.action);
        let outcome = match apply_change(env, op) {
            Ok(outcome) => outcome,
            Err(ApplyFailure::Op(message)) => {
                warn!("{}: {message}", op.address);
                OpOutcome::Failed { error: message }
            }
            Err(ApplyFailure::Run(e)) => return Err(e),
        };
        env.progress.op_finished(&op.address, &outcome);
        outcomes.insert(op.address.clone(), outcome);
    }
    Ok(())
}
