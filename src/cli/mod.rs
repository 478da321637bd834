//! CLI module for Gatekeeper
//!
//! Provides command-line interface for:
//! - start: Run the dispatcher and web server
//! - check-config: Validate configuration
//! - stats: Print identity store counts

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, run, run_command, start, stats};
pub use errors::{CliError, CliResult};
pub use io::write_response;
