use crate::cli::GraphArgs;
use crate::config::Config;
use crate::ui;
use anyhow::Result;
use converge_graph::DependencyGraph;

pub fn run(config: &Config, args: &GraphArgs) -> Result<()> {
    let document = super::load_document(config)?;
    let graph = DependencyGraph::build(&document)?;

    if args.dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    for (i, wave) in graph.waves().iter().enumerate() {
        ui::section(&format!("wave {}", i + 1));
        for address in wave {
            println!("  {address}");
            for dep in graph.dependencies_of(address) {
                ui::dim(&format!("  depends on {dep}"));
            }
        }
    }
    Ok(())
}
