use crate::cli::PlanArgs;
use crate::config::Config;
use crate::render;
use anyhow::Result;
use converge_engine::PlanOptions;
use converge_graph::DependencyGraph;
use converge_provider::{EnvSecretStore, ProviderRegistry};
use converge_state::FileStateStore;

pub fn run(config: &Config, args: &PlanArgs) -> Result<()> {
    let document = super::load_document(config)?;
    let graph = DependencyGraph::build(&document)?;
    let registry = ProviderRegistry::with_builtins();
    let store = FileStateStore::new(&config.state_path);

    // Refresh reads live resources, so even planning takes the lock.
    let guard = store.lock("plan", config.lock_timeout)?;
    let result = (|| -> Result<()> {
        let state = store.load()?;
        let options = PlanOptions {
            refresh: !args.no_refresh,
            strict_drift: args.strict_drift || config.strict_drift,
        };
        let planned = converge_engine::plan(
            &document,
            &graph,
            &state,
            &registry,
            &EnvSecretStore,
            &options,
        )?;
        render::print_plan(&planned);
        Ok(())
    })();
    guard.release()?;
    result
}
