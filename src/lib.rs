//! aeroquery - access-controlled streaming queries over metadata-described
//! documents, with pivot tables and SVG charts computed by a separate
//! aggregation engine.
//!
//! Reads flow through [`pipeline::QueryEngine`]: the caller is resolved,
//! the filter compiled, permissions applied, and records streamed one at a
//! time. [`aggregate`] feeds that stream to an [`bridge::AggregationBackend`].

pub mod access;
pub mod aggregate;
pub mod auth;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod errors;
pub mod filter;
pub mod http_server;
pub mod meta;
pub mod observability;
pub mod pipeline;
pub mod record;
pub mod rest_api;
pub mod store;
