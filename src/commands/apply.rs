use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::Config;
use crate::progress::ConsoleProgress;
use crate::{render, ui};
use anyhow::{Result, bail};
use converge_document::Document;
use converge_engine::{ExecuteOptions, PlanOptions};
use converge_graph::DependencyGraph;
use converge_provider::{EnvSecretStore, ProviderRegistry};
use converge_state::FileStateStore;
use dialoguer::Confirm;
use std::sync::atomic::AtomicBool;

pub fn run(ctx: &Context, config: &Config, args: &ApplyArgs) -> Result<()> {
    let document = super::load_document(config)?;
    converge(
        ctx,
        config,
        &document,
        &ConvergeArgs {
            auto_approve: args.auto_approve,
            dry_run: args.dry_run,
            jobs: args.jobs,
            strict_drift: args.strict_drift || config.strict_drift,
            prompt: "Apply these changes?",
        },
    )
}

pub(crate) struct ConvergeArgs {
    pub auto_approve: bool,
    pub dry_run: bool,
    pub jobs: Option<usize>,
    pub strict_drift: bool,
    pub prompt: &'static str,
}

/// Plan, confirm, execute, under one state lock
pub(crate) fn converge(
    ctx: &Context,
    config: &Config,
    document: &Document,
    args: &ConvergeArgs,
) -> Result<()> {
    let graph = DependencyGraph::build(document)?;
    let registry = ProviderRegistry::with_builtins();
    let store = FileStateStore::new(&config.state_path);

    let guard = store.lock("apply", config.lock_timeout)?;
    let result = run_locked(ctx, config, document, &graph, &registry, &store, args);
    guard.release()?;
    result
}

fn run_locked(
    ctx: &Context,
    config: &Config,
    document: &Document,
    graph: &DependencyGraph,
    registry: &ProviderRegistry,
    store: &FileStateStore,
    args: &ConvergeArgs,
) -> Result<()> {
    let mut state = store.load()?;
    let options = PlanOptions {
        refresh: true,
        strict_drift: args.strict_drift,
    };
    let planned = converge_engine::plan(
        document,
        graph,
        &state,
        registry,
        &EnvSecretStore,
        &options,
    )?;

    if !ctx.quiet {
        render::print_plan(&planned);
    }
    if !planned.has_changes() {
        return Ok(());
    }
    if !args.auto_approve && !args.dry_run {
        let confirmed = Confirm::new()
            .with_prompt(args.prompt)
            .default(false)
            .interact()?;
        if !confirmed {
            ui::info("aborted, nothing changed");
            return Ok(());
        }
    }

    let exec_options = ExecuteOptions {
        jobs: args.jobs.unwrap_or(config.jobs),
        dry_run: args.dry_run,
        retry: config.retry.clone(),
    };
    let progress = ConsoleProgress::new(planned.summary().total_changes(), ctx.quiet);
    let report = converge_engine::execute(
        &planned,
        document,
        graph,
        registry,
        &EnvSecretStore,
        store,
        &mut state,
        &exec_options,
        &progress,
        &AtomicBool::new(false),
    )?;
    progress.finish();

    if !ctx.quiet {
        render::print_report(&report);
    }
    if !report.summary.is_success() {
        bail!("{} operation(s) failed", report.summary.failed);
    }
    Ok(())
}
