//! CLI module for querytoken
//!
//! Provides command-line interface for:
//! - compile: token description to SQL and parameters
//! - explain: operation summary, complexity report and SQL
//! - run: execute against JSON fixture tables with the in-memory driver

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{compile, execute, explain, load_config, run, run_command};
pub use errors::{CliError, CliResult};
pub use io::{error_response, ok_response, read_json, write_error, write_response};
