mod cli;
mod commands;
mod config;
mod progress;
mod render;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, StateCommand};
use config::Config;
use std::io;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context { quiet: cli.quiet };
    let config = Config::load(cli.dir.as_deref(), cli.state.as_deref())?;

    match cli.command {
        Command::Validate => commands::validate::run(&config),
        Command::Plan(args) => commands::plan::run(&config, &args),
        Command::Apply(args) => commands::apply::run(&ctx, &config, &args),
        Command::Destroy(args) => commands::destroy::run(&ctx, &config, &args),
        Command::Graph(args) => commands::graph::run(&config, &args),
        Command::State(cmd) => match cmd {
            StateCommand::List => commands::state::list(&config),
            StateCommand::Show { address } => commands::state::show(&config, &address),
            StateCommand::Rm { address } => commands::state::rm(&config, &address),
        },
        Command::ForceUnlock { id } => commands::unlock::run(&config, &id),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "converge", &mut io::stdout());
            Ok(())
        }
    }
}
