//! # HTTP Server Module
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/rest/stream/:document/findStream` - NDJSON record stream
//! - `/rest/data/:document/pivot` - Pivot table
//! - `/rest/data/:document/graph` - SVG chart

pub mod config;
pub mod health_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use server::HttpServer;
