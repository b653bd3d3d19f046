//! Aggregation error types

use thiserror::Error;

pub type AggregationResult<T> = Result<T, AggregationError>;

/// Codes reported for graph failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorCode {
    ConfigMissing,
    TypeMissing,
    AxisXMissing,
    AxisYMissing,
    CategoryMissing,
    FieldNotFound,
    ProcessingError,
}

impl GraphErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphErrorCode::ConfigMissing => "GRAPH_CONFIG_MISSING",
            GraphErrorCode::TypeMissing => "GRAPH_CONFIG_TYPE_MISSING",
            GraphErrorCode::AxisXMissing => "GRAPH_CONFIG_AXIS_X_MISSING",
            GraphErrorCode::AxisYMissing => "GRAPH_CONFIG_AXIS_Y_MISSING",
            GraphErrorCode::CategoryMissing => "GRAPH_CONFIG_CATEGORY_MISSING",
            GraphErrorCode::FieldNotFound => "GRAPH_FIELD_NOT_FOUND",
            GraphErrorCode::ProcessingError => "GRAPH_PROCESSING_ERROR",
        }
    }

    /// User-facing message; `chart` names the graph type where relevant
    pub fn message(&self, chart: &str) -> String {
        match self {
            GraphErrorCode::ConfigMissing => {
                "Graph configuration not found. Please configure the graph before viewing it.".to_string()
            }
            GraphErrorCode::TypeMissing => {
                "Graph type not specified. Please select a valid graph type.".to_string()
            }
            GraphErrorCode::AxisXMissing => format!(
                "X axis not configured. Please configure the X axis for {} charts.",
                chart
            ),
            GraphErrorCode::AxisYMissing => format!(
                "Y axis not configured. Please configure the Y axis for {} charts.",
                chart
            ),
            GraphErrorCode::CategoryMissing => {
                "Category field not configured. Please configure the category field for pie charts."
                    .to_string()
            }
            GraphErrorCode::FieldNotFound => "The selected field for this chart is no longer available. Please edit the chart and choose a different field.".to_string(),
            GraphErrorCode::ProcessingError => "An error occurred while processing the graph. Please try again or contact support.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    // ==================
    // Pivot
    // ==================
    #[error("Rows are required for pivot table")]
    PivotRowsMissing,

    #[error("Values are required for pivot table")]
    PivotValuesMissing,

    #[error("Invalid {kind} config: {message}")]
    InvalidConfig { kind: &'static str, message: String },

    // ==================
    // KPI
    // ==================
    #[error("KPI aggregation '{0}' requires a field")]
    KpiFieldMissing(&'static str),

    // ==================
    // Graph
    // ==================
    #[error("{message}")]
    Graph {
        code: GraphErrorCode,
        message: String,
        details: Option<String>,
    },
}

impl AggregationError {
    pub fn graph(code: GraphErrorCode, chart: &str) -> Self {
        AggregationError::Graph {
            code,
            message: code.message(chart),
            details: None,
        }
    }

    pub fn graph_processing(details: impl Into<String>) -> Self {
        AggregationError::Graph {
            code: GraphErrorCode::ProcessingError,
            message: GraphErrorCode::ProcessingError.message(""),
            details: Some(details.into()),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AggregationError::Graph {
                code: GraphErrorCode::ProcessingError,
                ..
            } => 500,
            _ => 400,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            AggregationError::PivotRowsMissing
            | AggregationError::PivotValuesMissing
            | AggregationError::InvalidConfig { kind: "pivot", .. } => "PIVOT_CONFIG_INVALID",
            AggregationError::KpiFieldMissing(_)
            | AggregationError::InvalidConfig { kind: "kpi", .. } => "KPI_CONFIG_INVALID",
            AggregationError::InvalidConfig { .. } => "GRAPH_CONFIG_INVALID",
            AggregationError::Graph { code, .. } => code.as_str(),
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            AggregationError::Graph { details, .. } => details.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_status() {
        let err = AggregationError::graph(GraphErrorCode::AxisXMissing, "bar");
        assert_eq!(err.code(), "GRAPH_CONFIG_AXIS_X_MISSING");
        assert_eq!(
            err.to_string(),
            "X axis not configured. Please configure the X axis for bar charts."
        );
        assert_eq!(err.status_code(), 400);

        let err = AggregationError::graph_processing("RPC error -32603: boom");
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.details(), Some("RPC error -32603: boom"));
        assert_eq!(AggregationError::PivotRowsMissing.code(), "PIVOT_CONFIG_INVALID");

        let err = AggregationError::KpiFieldMissing("sum");
        assert_eq!(err.code(), "KPI_CONFIG_INVALID");
        assert_eq!(err.to_string(), "KPI aggregation 'sum' requires a field");
        assert_eq!(err.status_code(), 400);
    }
}
