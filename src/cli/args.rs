//! CLI argument definitions using clap
//!
//! Commands:
//! - querytoken compile --token <path> [--config <path>]
//! - querytoken explain --token <path> [--config <path>]
//! - querytoken run --token <path> --data <path> [--config <path>] [--unbounded] [--total]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// querytoken - compile validated query tokens to parameterized SQL
#[derive(Parser, Debug)]
#[command(name = "querytoken")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a token description and print its SQL and parameters
    Compile {
        /// JSON token description
        #[arg(long)]
        token: PathBuf,

        /// JSON configuration file; environment overrides still apply
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the operation summary, complexity report and SQL
    Explain {
        #[arg(long)]
        token: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Execute a token against JSON fixture tables
    Run {
        #[arg(long)]
        token: PathBuf,

        /// JSON object mapping table names to arrays of rows
        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip the default safety limit
        #[arg(long)]
        unbounded: bool,

        /// Also run a count query
        #[arg(long)]
        total: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
