//! Command-line interface
//!
//! - serve: boot the HTTP server from a config file
//! - compile: print the native query a filter compiles to

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{boot, compile, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
