//! CLI argument definitions using clap
//!
//! Commands:
//! - portadb init --config <path>
//! - portadb start --config <path>
//! - portadb query --config <path>
//! - portadb explain --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// portadb - a provider-agnostic document store, driven over JSON-lines
#[derive(Parser, Debug)]
#[command(name = "portadb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the default collection and its configured indexes
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./portadb.json")]
        config: PathBuf,
    },

    /// Open the store and serve JSON-lines requests on stdin/stdout
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./portadb.json")]
        config: PathBuf,
    },

    /// Execute a single statement read from stdin and exit
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./portadb.json")]
        config: PathBuf,
    },

    /// Parse a statement from stdin and print its AST without executing it
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./portadb.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
