//! CLI command definitions
//!
//! Defines the clap commands for the conformance CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Options shared by every command that talks to a server
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Configuration file (default: platform config dir)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Base URL of the API under test (overrides config)
    #[arg(long, short)]
    pub server: Option<String>,

    /// Directory of additional YAML fixture definitions
    #[arg(long)]
    pub fixtures: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenario files against the API
    Run {
        /// Scenario files or directories (default: ./scenarios)
        paths: Vec<PathBuf>,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Only run scenarios whose name contains this text or that carry this tag
        #[arg(long, short)]
        filter: Option<String>,

        /// Run scenario groups in concurrent lanes
        #[arg(long)]
        parallel: bool,

        /// Print every exchange, not only those of failed scenarios
        #[arg(long, short)]
        verbose: bool,
    },

    /// Validate scenario files without sending requests
    Check {
        /// Scenario files or directories (default: ./scenarios)
        paths: Vec<PathBuf>,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// List registered fixtures
    Fixtures {
        /// Directory of additional YAML fixture definitions
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },

    /// Build one fixture and print its outputs
    Fixture {
        /// Fixture name
        name: String,

        /// Parameter as key=value; values are parsed as JSON when possible
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Log every request and response
        #[arg(long, short)]
        verbose: bool,
    },
}
