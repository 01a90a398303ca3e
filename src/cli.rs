use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Declare desired state, plan a change-set, converge", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory containing declaration documents
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// State file path
    #[arg(long, global = true, value_name = "FILE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse documents and check the dependency graph
    Validate,

    /// Show what apply would change
    Plan(PlanArgs),

    /// Converge resources to the declared state
    Apply(ApplyArgs),

    /// Destroy every resource recorded in state
    Destroy(DestroyArgs),

    /// Show the dependency graph
    Graph(GraphArgs),

    /// Inspect and edit recorded state
    #[command(subcommand)]
    State(StateCommand),

    /// Remove an abandoned state lock
    ForceUnlock {
        /// Lock id, as printed in the lock conflict error
        id: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Fail if live resources drifted from recorded state
    #[arg(long)]
    pub strict_drift: bool,

    /// Diff against recorded state without reading live resources
    #[arg(long)]
    pub no_refresh: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub auto_approve: bool,

    /// Walk the plan without touching providers or state
    #[arg(long)]
    pub dry_run: bool,

    /// Parallel operations (defaults to the configured job count)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Fail if live resources drifted from recorded state
    #[arg(long)]
    pub strict_drift: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub auto_approve: bool,

    /// Parallel operations (defaults to the configured job count)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Parser)]
pub struct GraphArgs {
    /// Emit Graphviz dot instead of a listing
    #[arg(long)]
    pub dot: bool,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded resource addresses
    List,

    /// Show one record as JSON
    Show {
        /// Node address, e.g. resource.local_file.motd
        address: String,
    },

    /// Forget a record without destroying the resource
    Rm {
        /// Node address, e.g. resource.local_file.motd
        address: String,
    },
}
