//! Observability: `tracing` subscriber setup.

mod logging;

pub use logging::{env_filter, init_logging};
