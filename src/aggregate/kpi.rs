//! # KPI Orchestration
//!
//! `count` never starts an aggregation session: it is the total of a find
//! limited to one record. Every other operation projects the one field it
//! reads and folds it through the backend.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::config::{Aggregator, KpiConfig};
use super::errors::AggregationError;
use super::fields::ProjectionPlan;
use super::source::{open_records, AggregationRequest, DEFAULT_MAX_RECORDS};
use crate::bridge::{AggregationBackend, AggregationInit};
use crate::errors::{QueryError, QueryResult};
use crate::pipeline::QueryEngine;

/// Projection used when only the total matters
const COUNT_FIELDS: &str = "_id";

/// Public KPI result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiResult {
    pub success: bool,
    pub value: f64,
    /// Records that reached the aggregation
    pub count: u64,
    /// Records whose field was numeric; absent for `count`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_count: Option<u64>,
}

impl KpiResult {
    fn empty() -> Self {
        Self {
            success: true,
            value: 0.0,
            count: 0,
            valid_count: Some(0),
        }
    }
}

/// Rejects a non-count operation without a field
pub fn validate_kpi_config(config: &KpiConfig) -> Result<(), AggregationError> {
    if config.operation != Aggregator::Count && config.field().is_none() {
        return Err(AggregationError::KpiFieldMissing(config.operation.as_str()));
    }
    Ok(())
}

/// Runs KPI widgets over the streaming pipeline
#[derive(Clone)]
pub struct KpiOrchestrator {
    engine: QueryEngine,
    backend: Arc<dyn AggregationBackend>,
    max_records: usize,
}

impl KpiOrchestrator {
    pub fn new(engine: QueryEngine, backend: Arc<dyn AggregationBackend>) -> Self {
        Self {
            engine,
            backend,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    pub async fn run(&self, request: &AggregationRequest, config: &KpiConfig) -> QueryResult<KpiResult> {
        let started = Instant::now();
        validate_kpi_config(config)?;

        let result = match (config.operation, config.field()) {
            (Aggregator::Count, _) => self.count(request).await?,
            (_, Some(field)) => self.fold(request, config.operation, field).await?,
            (operation, None) => return Err(AggregationError::KpiFieldMissing(operation.as_str()).into()),
        };

        info!(
            document = %request.document,
            operation = config.operation.as_str(),
            count = result.count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "kpi finished"
        );
        Ok(result)
    }

    async fn count(&self, request: &AggregationRequest) -> QueryResult<KpiResult> {
        let mut find = request.find_request(COUNT_FIELDS.to_string(), 1);
        find.start = Some(0);
        let mut stream = self.engine.find_stream(&find).await?;
        let total = stream.take_total();
        drop(stream);

        let total = match total {
            Some(mut count) => count.wait().await?,
            None => 0,
        };
        debug!(document = %request.document, total, "kpi count from total");
        Ok(KpiResult {
            success: true,
            value: total as f64,
            count: total,
            valid_count: None,
        })
    }

    async fn fold(&self, request: &AggregationRequest, operation: Aggregator, field: &str) -> QueryResult<KpiResult> {
        let registry = self.engine.registry().clone();
        let meta = registry
            .meta(&request.document)
            .ok_or_else(|| QueryError::UnknownDocument(request.document.clone()))?;

        let mut plan = ProjectionPlan::new();
        plan.add(meta, field);
        let mut find = request.find_request(plan.fields_param(), self.max_records);
        find.get_total = false;
        find.transform_dates_to_string = false;
        debug!(document = %request.document, fields = %plan.fields_param(), "kpi projection planned");

        let Some(opened) = open_records(&self.engine, find).await? else {
            info!(document = %request.document, "kpi over empty result");
            return Ok(KpiResult::empty());
        };

        let init_config = json!({"operation": operation, "field": field});
        let table = self
            .backend
            .run(AggregationInit::kpi(init_config), opened.records)
            .await?
            .into_table()?;

        Ok(KpiResult {
            success: true,
            value: table.get("result").and_then(Value::as_f64).unwrap_or(0.0),
            count: table.get("count").and_then(Value::as_u64).unwrap_or(0),
            valid_count: table.get("validCount").and_then(Value::as_u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> KpiConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validation() {
        assert!(validate_kpi_config(&config(json!({"operation": "count"}))).is_ok());
        assert!(validate_kpi_config(&config(json!({"operation": "avg", "field": "amount"}))).is_ok());
        assert_eq!(
            validate_kpi_config(&config(json!({"operation": "avg"}))),
            Err(AggregationError::KpiFieldMissing("avg"))
        );
        assert_eq!(
            validate_kpi_config(&config(json!({"operation": "min", "field": ""}))),
            Err(AggregationError::KpiFieldMissing("min"))
        );
    }

    #[test]
    fn test_result_shape() {
        let count = KpiResult {
            success: true,
            value: 3.0,
            count: 3,
            valid_count: None,
        };
        assert_eq!(
            serde_json::to_value(&count).unwrap(),
            json!({"success": true, "value": 3.0, "count": 3})
        );
        assert_eq!(
            serde_json::to_value(KpiResult::empty()).unwrap(),
            json!({"success": true, "value": 0.0, "count": 0, "validCount": 0})
        );
    }
}
