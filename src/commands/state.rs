use crate::config::Config;
use crate::ui;
use anyhow::{Result, bail};
use converge_document::Address;
use converge_state::FileStateStore;

pub fn list(config: &Config) -> Result<()> {
    let store = FileStateStore::new(&config.state_path);
    let state = store.load()?;
    if state.is_empty() {
        ui::dim("state is empty");
        return Ok(());
    }
    for address in state.addresses() {
        println!("{address}");
    }
    Ok(())
}

pub fn show(config: &Config, address: &str) -> Result<()> {
    let address: Address = address.parse()?;
    let store = FileStateStore::new(&config.state_path);
    let state = store.load()?;
    let Some(record) = state.get(&address) else {
        bail!("{address} is not in state");
    };
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Forget a record without destroying the resource
pub fn rm(config: &Config, address: &str) -> Result<()> {
    let address: Address = address.parse()?;
    let store = FileStateStore::new(&config.state_path);
    let guard = store.lock("state rm", std::time::Duration::ZERO)?;
    let result = (|| -> Result<()> {
        let mut state = store.load()?;
        if state.remove(&address).is_none() {
            bail!("{address} is not in state");
        }
        store.save(&mut state)?;
        ui::success(&format!("{address} forgotten (resource left in place)"));
        Ok(())
    })();
    guard.release()?;
    result
}
