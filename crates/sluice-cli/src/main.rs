#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use commands::Project;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(author, version, about = "Bundle, post-process and watch front-end scripts", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Configuration environment (defaults to $NODE_ENV, then "development")
    #[arg(long = "env", global = true, value_name = "NAME")]
    environment: Option<String>,

    /// Configuration file, relative to the working directory
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Never install missing transforms, presets or plugins
    #[arg(long, global = true, env = "SLUICE_OFFLINE")]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Bundle the entry script once and run the plugin pipeline
    Build,

    /// Build, then rebuild whenever a script changes
    Watch,

    /// Show the resolved transform chain and plugin order without building
    Plan,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    let project = Project {
        cwd,
        config: cli.config,
        environment: sluice_core::config::environment_from_process(cli.environment.as_deref()),
        offline: cli.offline,
    };

    match cli.command {
        Commands::Build => commands::build::run(&project, cli.json),
        Commands::Watch => commands::watch::run(&project, cli.json),
        Commands::Plan => commands::plan::run(&project, cli.json),
    }
}
