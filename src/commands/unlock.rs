use crate::config::Config;
use crate::ui;
use anyhow::Result;
use converge_state::FileStateStore;

/// Remove an abandoned state lock by id
pub fn run(config: &Config, id: &str) -> Result<()> {
    let store = FileStateStore::new(&config.state_path);
    let holder = store.force_unlock(id)?;
    ui::success(&format!(
        "removed lock {} (operation `{}`, acquired {})",
        holder.id, holder.operation, holder.acquired_at
    ));
    Ok(())
}
