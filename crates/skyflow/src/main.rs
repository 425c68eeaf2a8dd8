mod commands;
mod context;
mod render;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::Outcome;
use commands::apply::ApplyArgs;
use context::Project;
use skyflow_core::ResourceAddress;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sky")]
#[command(about = "Declare it. Plan it. Apply it.", long_about = None)]
struct Cli {
    /// Stack file to use instead of searching the current directory
    #[arg(long, global = true, env = "SKYFLOW_STACK_PATH")]
    stack: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changes needed to reach the declared configuration
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
        /// Only plan these resources and what they depend on
        #[arg(long = "target", value_name = "ADDR")]
        targets: Vec<ResourceAddress>,
    },
    /// Apply the planned changes
    Apply {
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Only apply these resources and what they depend on
        #[arg(long = "target", value_name = "ADDR")]
        targets: Vec<ResourceAddress>,
        /// Maximum number of concurrent provider calls
        #[arg(short, long)]
        parallelism: Option<usize>,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Destroy without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Only destroy these resources and what depends on them
        #[arg(long = "target", value_name = "ADDR")]
        targets: Vec<ResourceAddress>,
    },
    /// Check the stack file without touching state
    Validate,
    /// Print the dependency graph in DOT format
    Graph,
    /// Read every recorded resource back from its provider
    Refresh,
    /// Inspect recorded state
    #[command(subcommand)]
    State(StateCommands),
    /// Mark a resource for replacement on the next apply
    Taint {
        address: ResourceAddress,
    },
    /// Clear a taint mark
    Untaint {
        address: ResourceAddress,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// List recorded resources
    List,
    /// Show one recorded resource as JSON
    Show { address: ResourceAddress },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let stack = cli.stack.as_deref();

    match cli.command {
        Commands::Version => {
            println!("skyflow {}", env!("CARGO_PKG_VERSION"));
            Ok(Outcome::Success)
        }
        Commands::Plan { json, targets } => {
            let project = Project::discover(stack)?;
            commands::plan::handle(&project, targets, json).await
        }
        Commands::Apply {
            yes,
            targets,
            parallelism,
        } => {
            let project = Project::discover(stack)?;
            let args = ApplyArgs {
                targets,
                parallelism,
                yes,
                destroy: false,
            };
            commands::apply::handle(&project, args).await
        }
        Commands::Destroy { yes, targets } => {
            let project = Project::discover_for_state(stack)?;
            let args = ApplyArgs {
                targets,
                parallelism: None,
                yes,
                destroy: true,
            };
            commands::apply::handle(&project, args).await
        }
        Commands::Validate => {
            let project = Project::discover(stack)?;
            commands::validate::handle(&project)
        }
        Commands::Graph => {
            let project = Project::discover(stack)?;
            commands::graph::handle(&project)
        }
        Commands::Refresh => {
            let project = Project::discover_for_state(stack)?;
            commands::refresh::handle(&project).await
        }
        Commands::State(StateCommands::List) => {
            let project = Project::discover_for_state(stack)?;
            commands::state::list(&project).await
        }
        Commands::State(StateCommands::Show { address }) => {
            let project = Project::discover_for_state(stack)?;
            commands::state::show(&project, &address).await
        }
        Commands::Taint { address } => {
            let project = Project::discover_for_state(stack)?;
            commands::state::taint(&project, &address).await
        }
        Commands::Untaint { address } => {
            let project = Project::discover_for_state(stack)?;
            commands::state::untaint(&project, &address).await
        }
    }
}
