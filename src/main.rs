//! aeroquery entry point
//!
//! Parses arguments and dispatches through `cli::run`; errors go to stderr
//! and set the exit status from their code.

use aeroquery::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(e.code().exit_code());
    }
}
