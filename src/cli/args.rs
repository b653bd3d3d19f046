//! CLI argument definitions using clap
//!
//! Commands:
//! - aeroquery serve --config <path>
//! - aeroquery compile --config <path> --document <name> --filter <json>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AeroQuery - access-controlled streaming queries with pivot and chart aggregation
#[derive(Parser, Debug)]
#[command(name = "aeroquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroquery.json")]
        config: PathBuf,

        /// Overrides server.port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the native query a filter compiles to
    Compile {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroquery.json")]
        config: PathBuf,

        /// Document the filter applies to
        #[arg(long)]
        document: String,

        /// Filter as JSON
        #[arg(long)]
        filter: String,

        /// Caller id used for `$user` tokens
        #[arg(long, default_value = "cli")]
        user: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
