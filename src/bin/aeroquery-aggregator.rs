//! Aggregator process: reads the init line and records from stdin, writes
//! the status line and the pivot or KPI JSON or the chart SVG to stdout.

use std::io::{self, BufReader};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let stdin = io::stdin();
    let stdout = io::stdout();
    match aeroquery::aggregate::engine::run_stdio(BufReader::new(stdin.lock()), stdout.lock()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
