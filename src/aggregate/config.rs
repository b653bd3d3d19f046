//! Pivot and graph configuration shapes, as requested and as enriched.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    Count,
    #[default]
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregator::Count => "count",
            Aggregator::Sum => "sum",
            Aggregator::Avg => "avg",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
        }
    }
}

/// Date bucketing for column dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateBucket {
    D,
    W,
    M,
    Q,
    Y,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

// ==================
// Pivot request
// ==================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotConfig {
    #[serde(default)]
    pub columns: Vec<PivotColumn>,
    #[serde(default)]
    pub rows: Vec<PivotRow>,
    #[serde(default)]
    pub values: Vec<PivotValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PivotOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotColumn {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Date bucket for date columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<DateBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRow {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_subtotal: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotValue {
    pub field: String,
    #[serde(default)]
    pub aggregator: Aggregator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_row_grand_totals: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_col_grand_totals: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_subtotals: Option<bool>,
}

// ==================
// Pivot enriched
// ==================

/// How a lookup dimension is labelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupDisplay {
    pub document: String,
    pub display_field: String,
    /// `"{name} ({code} - {status})"`
    pub format_pattern: String,
    pub simple_fields: Vec<String>,
    pub nested_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PicklistOption {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRowMeta {
    pub field: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default = "default_type")]
    pub field_type: String,
    #[serde(default)]
    pub level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotColumnMeta {
    pub field: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default = "default_type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<PicklistOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<DateBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotValueMeta {
    pub field: String,
    #[serde(default)]
    pub aggregator: Aggregator,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default = "default_type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// What the aggregation engine receives for a pivot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotEnrichedConfig {
    #[serde(default)]
    pub rows: Vec<PivotRowMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<PivotColumnMeta>,
    #[serde(default)]
    pub values: Vec<PivotValueMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PivotOptions>,
    /// Label for missing dimension values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blank_text: Option<String>,
}

fn default_type() -> String {
    "text".to_string()
}

// ==================
// Graph
// ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphType {
    Bar,
    Line,
    Pie,
    Scatter,
    Histogram,
    TimeSeries,
}

impl GraphType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphType::Bar => "bar",
            GraphType::Line => "line",
            GraphType::Pie => "pie",
            GraphType::Scatter => "scatter",
            GraphType::Histogram => "histogram",
            GraphType::TimeSeries => "timeSeries",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphAxis {
    #[serde(default)]
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl GraphAxis {
    /// The field, when one is configured
    pub fn field(axis: &Option<GraphAxis>) -> Option<&str> {
        axis.as_ref()
            .map(|a| a.field.as_str())
            .filter(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub graph_type: Option<GraphType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<GraphAxis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<GraphAxis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_field_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_legend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_grid: Option<bool>,
}

impl GraphConfig {
    pub fn x_field(&self) -> Option<&str> {
        GraphAxis::field(&self.x_axis)
    }

    pub fn y_field(&self) -> Option<&str> {
        GraphAxis::field(&self.y_axis)
    }

    pub fn category(&self) -> Option<&str> {
        self.category_field.as_deref().filter(|f| !f.is_empty())
    }
}

/// Single-value aggregation over one numeric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiConfig {
    pub operation: Aggregator,
    /// Required for every operation but `count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl KpiConfig {
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }
}
