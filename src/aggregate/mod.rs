//! # Aggregation
//!
//! Pivot tables, charts and KPI values computed over the streaming pipeline.
//!
//! # Modules
//! - `config`: request and enriched config shapes
//! - `fields`: label resolution and projection planning
//! - `source`: shared request parameters and record opening
//! - `pivot`, `graph`, `kpi`: the orchestrators
//! - `engine`: the folding engine shared by the aggregator binary and the
//!   in-process backend

pub mod config;
pub mod engine;
pub mod errors;
pub mod fields;
pub mod graph;
pub mod kpi;
pub mod pivot;
pub mod source;

pub use config::{GraphConfig, KpiConfig, PivotConfig, PivotEnrichedConfig};
pub use errors::{AggregationError, AggregationResult, GraphErrorCode};
pub use graph::{GraphOrchestrator, GraphResult, EMPTY_SVG};
pub use kpi::{KpiOrchestrator, KpiResult};
pub use pivot::{PivotOrchestrator, PivotResult};
pub use source::{AggregationRequest, DEFAULT_MAX_RECORDS};
