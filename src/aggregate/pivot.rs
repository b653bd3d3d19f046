//! # Pivot Orchestration
//!
//! `Validate -> Enrich -> Find -> Aggregate -> Reshape`.
//!
//! The enriched config carries everything the engine needs to label rows
//! and columns, so the engine never consults metadata itself.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::config::{
    PicklistOption, PivotColumnMeta, PivotConfig, PivotEnrichedConfig, PivotRowMeta, PivotValueMeta,
};
use super::errors::AggregationError;
use super::fields::{lookup_display, resolve_field, ProjectionPlan};
use super::source::{open_records, AggregationRequest, DEFAULT_MAX_RECORDS};
use crate::bridge::{AggregationBackend, AggregationInit};
use crate::errors::{QueryError, QueryResult};
use crate::meta::{localized, MetaObject, MetaRegistry};
use crate::pipeline::QueryEngine;

/// Label for missing dimension values in `lang`
pub fn blank_text(lang: &str) -> &'static str {
    if lang == "pt_BR" {
        "(vazio)"
    } else {
        "(blank)"
    }
}

/// Dimensions and measures as enriched for the response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotMetadata {
    pub rows: Vec<PivotRowMeta>,
    pub columns: Vec<PivotColumnMeta>,
    pub values: Vec<PivotValueMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitInfo {
    pub limited: bool,
    pub limit: usize,
    pub total: u64,
}

/// Public pivot result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotResult {
    pub success: bool,
    pub metadata: PivotMetadata,
    pub data: Value,
    pub grand_totals: Value,
    pub column_headers: Value,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_info: Option<LimitInfo>,
}

/// Rejects configs missing rows or values
pub fn validate_pivot_config(config: &PivotConfig) -> Result<(), AggregationError> {
    if config.rows.is_empty() {
        return Err(AggregationError::PivotRowsMissing);
    }
    if config.values.is_empty() {
        return Err(AggregationError::PivotValuesMissing);
    }
    Ok(())
}

/// Resolves labels, types, picklist options and lookup display for every
/// dimension and measure
pub fn enrich_pivot_config(
    registry: &MetaRegistry,
    meta: &MetaObject,
    config: &PivotConfig,
    lang: &str,
) -> PivotEnrichedConfig {
    let resolve = |path: &str| resolve_field(registry, meta, path, lang);

    let rows = config
        .rows
        .iter()
        .enumerate()
        .map(|(level, row)| {
            let resolved = resolve(&row.field);
            PivotRowMeta {
                field: row.field.clone(),
                label: resolved.as_ref().map(|r| r.label.clone()).unwrap_or_else(|| row.field.clone()),
                field_type: resolved.as_ref().map(|r| r.field_type.clone()).unwrap_or_else(|| "text".into()),
                level,
                lookup: resolved.as_ref().and_then(|r| r.meta.as_ref()).and_then(lookup_display),
                order: row.order,
            }
        })
        .collect();

    let columns = config
        .columns
        .iter()
        .map(|column| {
            let resolved = resolve(&column.field);
            let field_meta = resolved.as_ref().and_then(|r| r.meta.as_ref());
            let field_type = resolved.as_ref().map(|r| r.field_type.clone()).unwrap_or_else(|| "text".into());
            let values = field_meta.filter(|f| !f.options.is_empty()).map(|f| {
                f.options
                    .iter()
                    .map(|(key, labels)| PicklistOption {
                        key: key.clone(),
                        label: localized(labels, lang).unwrap_or(key.as_str()).to_string(),
                    })
                    .collect()
            });
            let bucket = column
                .aggregator
                .filter(|_| matches!(field_type.as_str(), "date" | "dateTime"));
            PivotColumnMeta {
                field: column.field.clone(),
                label: resolved.as_ref().map(|r| r.label.clone()).unwrap_or_else(|| column.field.clone()),
                field_type,
                values,
                lookup: field_meta.and_then(lookup_display),
                bucket,
                order: column.order,
            }
        })
        .collect();

    let values = config
        .values
        .iter()
        .map(|value| {
            let resolved = resolve(&value.field);
            let field_type = resolved.as_ref().map(|r| r.field_type.clone()).unwrap_or_else(|| "number".into());
            let format = value
                .format
                .clone()
                .or_else(|| matches!(field_type.as_str(), "money" | "currency").then(|| "currency".to_string()));
            PivotValueMeta {
                field: value.field.clone(),
                aggregator: value.aggregator,
                label: resolved.as_ref().map(|r| r.label.clone()).unwrap_or_else(|| value.field.clone()),
                field_type,
                format,
            }
        })
        .collect();

    PivotEnrichedConfig {
        rows,
        columns,
        values,
        options: config.options.clone(),
        blank_text: Some(blank_text(lang).to_string()),
    }
}

/// Runs pivots over the streaming pipeline
#[derive(Clone)]
pub struct PivotOrchestrator {
    engine: QueryEngine,
    backend: Arc<dyn AggregationBackend>,
    max_records: usize,
}

impl PivotOrchestrator {
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

    pub async fn run(&self, request: &AggregationRequest, config: &PivotConfig) -> QueryResult<PivotResult> {
        let started = Instant::now();
        validate_pivot_config(config)?;

        let registry = self.engine.registry().clone();
        let meta = registry
            .meta(&request.document)
            .ok_or_else(|| QueryError::UnknownDocument(request.document.clone()))?;
        let enriched = enrich_pivot_config(&registry, meta, config, &request.lang);

        let mut plan = ProjectionPlan::new();
        for path in enriched
            .rows
            .iter()
            .map(|r| &r.field)
            .chain(enriched.columns.iter().map(|c| &c.field))
            .chain(enriched.values.iter().map(|v| &v.field))
        {
            plan.add(meta, path);
        }
        let mut find = request.find_request(plan.fields_param(), self.max_records);
        find.lookups = plan.lookups();
        debug!(
            document = %request.document,
            fields = %plan.fields_param(),
            lookups = find.lookups.len(),
            "pivot projection planned"
        );

        let metadata = PivotMetadata {
            rows: enriched.rows.clone(),
            columns: enriched.columns.clone(),
            values: enriched.values.clone(),
        };

        let Some(opened) = open_records(&self.engine, find).await? else {
            info!(document = %request.document, "pivot over empty result");
            return Ok(PivotResult {
                success: true,
                metadata,
                data: json!([]),
                grand_totals: json!({"cells": {}, "totals": {}}),
                column_headers: json!([]),
                total: 0,
                limit_info: None,
            });
        };

        let init_config = serde_json::to_value(&enriched)
            .map_err(|e| AggregationError::InvalidConfig { kind: "pivot", message: e.to_string() })?;
        let mut table = self
            .backend
            .run(AggregationInit::pivot(init_config), opened.records)
            .await?
            .into_table()?;

        let total = match opened.total {
            Some(mut count) => count.wait().await?,
            None => 0,
        };
        let limit_info = (total > self.max_records as u64).then(|| {
            warn!(
                document = %request.document,
                total,
                limit = self.max_records,
                "pivot truncated at record limit"
            );
            LimitInfo {
                limited: true,
                limit: self.max_records,
                total,
            }
        });

        info!(
            document = %request.document,
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pivot finished"
        );

        Ok(PivotResult {
            success: true,
            metadata,
            data: table.get_mut("data").map(Value::take).unwrap_or_else(|| json!([])),
            grand_totals: table
                .get_mut("grandTotals")
                .map(Value::take)
                .unwrap_or_else(|| json!({"cells": {}, "totals": {}})),
            column_headers: table.get_mut("columnHeaders").map(Value::take).unwrap_or_else(|| json!([])),
            total,
            limit_info,
        })
    }
}
