//! # Graph Orchestration
//!
//! Validation happens before any query runs and reports one of the
//! `GRAPH_*` codes. Failures after the session starts are reported as
//! `GRAPH_PROCESSING_ERROR` with the underlying message as details.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::config::{Aggregator, GraphAxis, GraphConfig, GraphType};
use super::errors::{AggregationError, GraphErrorCode};
use super::fields::{resolve_field, ProjectionPlan};
use super::source::{open_records, AggregationRequest, DEFAULT_MAX_RECORDS};
use crate::bridge::{AggregationBackend, AggregationInit};
use crate::errors::{QueryError, QueryResult};
use crate::meta::{localized, MetaObject, MetaRegistry};
use crate::pipeline::QueryEngine;
use crate::record::root_segment;

/// Markup returned when no record matched
pub const EMPTY_SVG: &str = "<svg></svg>";

#[derive(Debug, Clone, PartialEq)]
pub struct GraphResult {
    pub svg: String,
    /// Matching records, when the count resolved
    pub total: Option<u64>,
}

/// Checks the fields each chart type needs
pub fn validate_graph_config(config: Option<&GraphConfig>) -> Result<(&GraphConfig, GraphType), AggregationError> {
    let config = config.ok_or_else(|| AggregationError::graph(GraphErrorCode::ConfigMissing, ""))?;
    let kind = config
        .graph_type
        .ok_or_else(|| AggregationError::graph(GraphErrorCode::TypeMissing, ""))?;
    let chart = kind.as_str();

    let needs_x = matches!(
        kind,
        GraphType::Bar | GraphType::Line | GraphType::Scatter | GraphType::TimeSeries
    );
    let needs_y = match kind {
        GraphType::Scatter | GraphType::Histogram | GraphType::TimeSeries => true,
        GraphType::Bar => matches!(config.aggregation, Some(a) if a != Aggregator::Count),
        GraphType::Line => config.aggregation != Some(Aggregator::Count),
        GraphType::Pie => false,
    };

    if kind == GraphType::Pie && config.category().is_none() {
        return Err(AggregationError::graph(GraphErrorCode::CategoryMissing, chart));
    }
    if needs_x && config.x_field().is_none() {
        return Err(AggregationError::graph(GraphErrorCode::AxisXMissing, chart));
    }
    if needs_y && config.y_field().is_none() {
        return Err(AggregationError::graph(GraphErrorCode::AxisYMissing, chart));
    }
    Ok((config, kind))
}

/// Every configured field must exist on the document; `_` fields are system fields
pub fn check_graph_fields(config: &GraphConfig, meta: &MetaObject) -> Result<(), AggregationError> {
    let known = |path: &str| {
        let root = root_segment(path);
        root.starts_with('_') || meta.field(root).is_some()
    };
    let missing = [config.x_field(), config.y_field(), config.category()]
        .into_iter()
        .flatten()
        .any(|path| !known(path));
    if missing {
        return Err(AggregationError::graph(GraphErrorCode::FieldNotFound, ""));
    }
    Ok(())
}

/// Fills axis labels from metadata and the default title
pub fn enrich_graph_config(
    registry: &MetaRegistry,
    meta: &MetaObject,
    config: &GraphConfig,
    lang: &str,
) -> GraphConfig {
    let mut enriched = config.clone();
    let label_of = |field: &str| {
        resolve_field(registry, meta, field, lang)
            .map(|r| r.label)
            .unwrap_or_else(|| field.to_string())
    };
    let needs_label = |label: Option<&str>, field: &str| match label {
        None => true,
        Some(l) => l.is_empty() || l == field || l.starts_with('_'),
    };

    let fill = |axis: &mut Option<GraphAxis>| {
        if let Some(axis) = axis.as_mut().filter(|a| !a.field.is_empty()) {
            if needs_label(axis.label.as_deref(), &axis.field) {
                axis.label = Some(label_of(&axis.field));
            }
        }
    };
    fill(&mut enriched.x_axis);
    fill(&mut enriched.y_axis);

    if let Some(category) = config.category() {
        if needs_label(config.category_field_label.as_deref(), category) {
            enriched.category_field_label = Some(label_of(category));
        }
    }

    if enriched.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        let module = localized(&meta.label, lang).unwrap_or(meta.name.as_str()).to_string();
        let grouping = match enriched.graph_type {
            Some(GraphType::Pie) => enriched.category_field_label.clone(),
            Some(GraphType::Histogram) => enriched.y_axis.as_ref().and_then(|a| a.label.clone()),
            _ => enriched
                .x_axis
                .as_ref()
                .and_then(|a| a.label.clone())
                .or_else(|| enriched.category_field_label.clone()),
        };
        if let Some(grouping) = grouping {
            let by = if lang == "en" { "by" } else { "por" };
            enriched.title = Some(format!("{} {} {}", module, by, grouping));
        }
    }
    enriched
}

/// Runs charts over the streaming pipeline
#[derive(Clone)]
pub struct GraphOrchestrator {
    engine: QueryEngine,
    backend: Arc<dyn AggregationBackend>,
    max_records: usize,
}

impl GraphOrchestrator {
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

    pub async fn run(&self, request: &AggregationRequest, config: Option<&GraphConfig>) -> QueryResult<GraphResult> {
        let started = Instant::now();
        let (config, kind) = validate_graph_config(config)?;

        let registry = self.engine.registry().clone();
        let meta = registry
            .meta(&request.document)
            .ok_or_else(|| QueryError::UnknownDocument(request.document.clone()))?;
        check_graph_fields(config, meta)?;
        let enriched = enrich_graph_config(&registry, meta, config, &request.lang);

        let mut plan = ProjectionPlan::new();
        for path in [enriched.x_field(), enriched.y_field(), enriched.category()]
            .into_iter()
            .flatten()
        {
            plan.add(meta, path);
        }
        let mut find = request.find_request(plan.fields_param(), self.max_records);
        find.lookups = plan.lookups();

        let Some(opened) = open_records(&self.engine, find).await? else {
            info!(document = %request.document, chart = kind.as_str(), "graph over empty result");
            return Ok(GraphResult {
                svg: EMPTY_SVG.to_string(),
                total: Some(0),
            });
        };

        let init_config = serde_json::to_value(&enriched)
            .map_err(|e| AggregationError::graph_processing(e.to_string()))?;
        let svg = self
            .backend
            .run(AggregationInit::graph(init_config), opened.records)
            .await
            .and_then(|output| output.into_svg())
            .map_err(|e| AggregationError::graph_processing(e.to_string()))?;

        let total = match opened.total {
            Some(mut count) => match count.wait().await {
                Ok(total) => Some(total),
                Err(err) => {
                    warn!(document = %request.document, error = %err, "graph total unavailable");
                    None
                }
            },
            None => None,
        };

        info!(
            document = %request.document,
            chart = kind.as_str(),
            total = ?total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graph finished"
        );
        Ok(GraphResult { svg, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(value: serde_json::Value) -> GraphConfig {
        serde_json::from_value(value).unwrap()
    }

    fn code(config: Option<&GraphConfig>) -> Option<&'static str> {
        validate_graph_config(config).err().map(|e| match e {
            AggregationError::Graph { code, .. } => code.as_str(),
            _ => "OTHER",
        })
    }

    #[test]
    fn test_validation_codes() {
        assert_eq!(code(None), Some("GRAPH_CONFIG_MISSING"));
        assert_eq!(code(Some(&graph(json!({})))), Some("GRAPH_CONFIG_TYPE_MISSING"));
        assert_eq!(code(Some(&graph(json!({"type": "pie"})))), Some("GRAPH_CONFIG_CATEGORY_MISSING"));
        assert_eq!(
            code(Some(&graph(json!({"type": "bar", "yAxis": {"field": "n"}})))),
            Some("GRAPH_CONFIG_AXIS_X_MISSING")
        );
        assert_eq!(
            code(Some(&graph(json!({"type": "scatter", "xAxis": {"field": "x"}})))),
            Some("GRAPH_CONFIG_AXIS_Y_MISSING")
        );
        assert_eq!(
            code(Some(&graph(json!({"type": "bar", "xAxis": {"field": "x"}, "aggregation": "avg"})))),
            Some("GRAPH_CONFIG_AXIS_Y_MISSING")
        );
        assert_eq!(code(Some(&graph(json!({"type": "bar", "xAxis": {"field": "x"}})))), None);
        assert_eq!(code(Some(&graph(json!({"type": "pie", "categoryField": "s"})))), None);

        let err = validate_graph_config(Some(&graph(json!({"type": "line"})))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "X axis not configured. Please configure the X axis for line charts."
        );
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_fields_and_labels() {
        let registry = MetaRegistry::from_json_str(
            r#"{"metas": {"Deal": {"label": {"en": "Deals", "pt_BR": "Negócios"}, "fields": {
                "status": {"type": "picklist", "label": {"en": "Status", "pt_BR": "Situação"}},
                "amount": {"type": "money", "label": {"en": "Amount"}}
            }}}}"#,
        )
        .unwrap();
        let meta = registry.meta("Deal").unwrap();

        let missing = graph(json!({"type": "pie", "categoryField": "gone"}));
        assert_eq!(
            check_graph_fields(&missing, meta).unwrap_err().code(),
            "GRAPH_FIELD_NOT_FOUND"
        );
        let system = graph(json!({"type": "bar", "xAxis": {"field": "_createdAt"}}));
        assert!(check_graph_fields(&system, meta).is_ok());

        let config = graph(json!({
            "type": "bar",
            "xAxis": {"field": "status", "label": "status"},
            "yAxis": {"field": "amount.value", "label": "Total"},
            "aggregation": "sum"
        }));
        let enriched = enrich_graph_config(&registry, meta, &config, "en");
        assert_eq!(enriched.x_axis.as_ref().unwrap().label.as_deref(), Some("Status"));
        assert_eq!(enriched.y_axis.as_ref().unwrap().label.as_deref(), Some("Total"));
        assert_eq!(enriched.title.as_deref(), Some("Deals by Status"));

        let pie = graph(json!({"type": "pie", "categoryField": "status"}));
        let enriched = enrich_graph_config(&registry, meta, &pie, "pt_BR");
        assert_eq!(enriched.category_field_label.as_deref(), Some("Situação"));
        assert_eq!(enriched.title.as_deref(), Some("Negócios por Situação"));
    }
}
