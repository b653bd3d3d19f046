//! # REST API Module
//!
//! HTTP endpoints for streaming reads, pivots, charts and KPI values.

pub mod errors;
pub mod handler;
pub mod parser;
pub mod server;

pub use errors::{RestError, RestResult};
pub use handler::{RestState, NDJSON_CONTENT_TYPE, SVG_CONTENT_TYPE, TOTAL_HEADER};
pub use parser::{extract_token, QueryParams, TOKEN_COOKIE};
pub use server::RestServer;
