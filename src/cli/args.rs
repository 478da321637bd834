//! CLI argument definitions using clap
//!
//! Commands:
//! - gatekeeper start --config <path>
//! - gatekeeper check-config --config <path>
//! - gatekeeper stats --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gatekeeper - work-email verification for community chat spaces
#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the event dispatcher and the web server until Ctrl-C
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./gatekeeper.json")]
        config: PathBuf,
    },

    /// Validate the configuration file and print a summary
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./gatekeeper.json")]
        config: PathBuf,
    },

    /// Print record counts from the identity store
    Stats {
        /// Path to configuration file
        #[arg(long, default_value = "./gatekeeper.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["gatekeeper", "check-config", "--config", "/tmp/g.json"]);
        match cli.command {
            Command::CheckConfig { config } => assert_eq!(config, PathBuf::from("/tmp/g.json")),
            other => panic!("unexpected {:?}", other),
        }

        let cli = Cli::parse_from(["gatekeeper", "stats"]);
        assert!(matches!(cli.command, Command::Stats { config } if config == PathBuf::from("./gatekeeper.json")));
    }
}
