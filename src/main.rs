//! API conformance CLI
//!
//! Runs YAML scenarios against a live HTTP API and reports one pass/fail per
//! assertion.

use clap::Parser;
use conformance::common::logging;
use conformance::{cli, commands};
use commands::Commands;

#[derive(Parser)]
#[command(name = "conformance", about = "Black-box HTTP API conformance harness")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Run { verbose, .. } | Commands::Fixture { verbose, .. } => *verbose,
        _ => false,
    };
    logging::init_cli(verbose);

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
