//! # Aggregation Engine
//!
//! Folds a record stream into a pivot table, a chart or a single KPI value. The engine runs
//! either inside the aggregator binary, reading the line protocol from
//! stdin, or in-process behind [`crate::bridge::InProcessBackend`].

pub mod accumulator;
pub mod chart;
pub mod kpi;
pub mod pivot_table;
pub mod stdio;
pub mod values;

use serde_json::Value;
use thiserror::Error;

use crate::aggregate::config::{GraphConfig, KpiConfig, PivotEnrichedConfig};
use crate::bridge::protocol::{
    AggregationMethod, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::bridge::AggregationOutput;
use crate::record::Record;

pub use chart::ChartBuilder;
pub use kpi::KpiBuilder;
pub use pivot_table::PivotBuilder;
pub use stdio::run_stdio;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("{0}")]
    InvalidParams(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// JSON-RPC error code
    pub fn rpc_code(&self) -> i64 {
        match self {
            EngineError::MethodNotFound(_) => METHOD_NOT_FOUND,
            EngineError::InvalidParams(_) => INVALID_PARAMS,
            EngineError::Parse(_) => PARSE_ERROR,
            EngineError::Internal(_) => INTERNAL_ERROR,
        }
    }
}

/// One running aggregation
#[derive(Debug, Clone)]
pub enum Session {
    Pivot(PivotBuilder),
    Graph(ChartBuilder),
    Kpi(KpiBuilder),
}

impl Session {
    pub fn start(method: AggregationMethod, config: &Value) -> Result<Self, EngineError> {
        if !config.is_object() {
            return Err(EngineError::InvalidParams("config is required".to_string()));
        }
        match method {
            AggregationMethod::Pivot => {
                let config: PivotEnrichedConfig = serde_json::from_value(config.clone())
                    .map_err(|e| EngineError::InvalidParams(format!("Invalid pivot config: {}", e)))?;
                Ok(Session::Pivot(PivotBuilder::new(config)?))
            }
            AggregationMethod::Graph => {
                let config: GraphConfig = serde_json::from_value(config.clone())
                    .map_err(|e| EngineError::InvalidParams(format!("Invalid graph config: {}", e)))?;
                Ok(Session::Graph(ChartBuilder::new(config)?))
            }
            AggregationMethod::Kpi => {
                let config: KpiConfig = serde_json::from_value(config.clone())
                    .map_err(|e| EngineError::InvalidParams(format!("Invalid kpi config: {}", e)))?;
                Ok(Session::Kpi(KpiBuilder::new(config)?))
            }
        }
    }

    pub fn push(&mut self, record: &Record) {
        match self {
            Session::Pivot(pivot) => pivot.push(record),
            Session::Graph(chart) => chart.push(record),
            Session::Kpi(kpi) => kpi.push(record),
        }
    }

    /// Records consumed so far
    pub fn rows(&self) -> u64 {
        match self {
            Session::Pivot(pivot) => pivot.records(),
            Session::Graph(chart) => chart.records(),
            Session::Kpi(kpi) => kpi.records(),
        }
    }

    pub fn finish(self) -> AggregationOutput {
        match self {
            Session::Pivot(pivot) => AggregationOutput::Table(pivot.finish()),
            Session::Graph(chart) => AggregationOutput::Svg(chart.render()),
            Session::Kpi(kpi) => AggregationOutput::Table(kpi.finish()),
        }
    }
}
