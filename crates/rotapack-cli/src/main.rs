mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    info!("rotapack v{} starting up", env!("CARGO_PKG_VERSION"));
    debug!("Parsed CLI arguments: {:?}", &cli);

    let result = match cli.command {
        Commands::Cache(args) => commands::cache::run(args),
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Classify(args) => commands::classify::run(args),
    };

    if let Err(e) = &result {
        error!("Command failed: {e}");
    }
    result
}
