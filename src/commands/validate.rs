use crate::config::Config;
use crate::ui;
use anyhow::Result;
use converge_graph::DependencyGraph;

pub fn run(config: &Config) -> Result<()> {
    let document = super::load_document(config)?;
    let graph = DependencyGraph::build(&document)?;
    ui::success(&format!(
        "{} is valid: {} resources, {} data sources, {} graph nodes",
        config.document_dir.display(),
        document.resources.len(),
        document.data.len(),
        graph.len()
    ));
    Ok(())
}
