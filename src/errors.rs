//! # Query Errors
//!
//! Every failure a request can end in, with its HTTP status and a stable
//! code. Errors surface to callers as a uniform
//! `{ success: false, errors: [{ message, code }] }` body.

use serde::Serialize;
use thiserror::Error;

use crate::access::AccessError;
use crate::aggregate::AggregationError;
use crate::auth::AuthError;
use crate::bridge::BridgeError;
use crate::filter::CompileError;
use crate::pipeline::StreamError;
use crate::store::StoreError;

/// Result type for request handling
pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    // ==================
    // Request Errors
    // ==================
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("[{0}] Document not found")]
    UnknownDocument(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ==================
    // Execution Errors
    // ==================
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl QueryError {
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::Auth(err) => err.status_code(),
            QueryError::Access(err) => err.status_code(),
            QueryError::Compile(_) | QueryError::InvalidRequest(_) => 400,
            QueryError::UnknownDocument(_) => 404,
            QueryError::Store(err) if err.is_query_error() => 400,
            QueryError::Aggregation(err) => err.status_code(),
            QueryError::Store(_) | QueryError::Stream(_) | QueryError::Bridge(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> String {
        match self {
            QueryError::Auth(_) => "AUTH_ERROR".to_string(),
            QueryError::Access(AccessError::Condition(_)) => "COMPILE_ERROR".to_string(),
            QueryError::Access(_) => "ACCESS_DENIED".to_string(),
            QueryError::Compile(_) => "COMPILE_ERROR".to_string(),
            QueryError::UnknownDocument(_) => "DOCUMENT_NOT_FOUND".to_string(),
            QueryError::InvalidRequest(_) => "INVALID_REQUEST".to_string(),
            QueryError::Store(_) => "STORE_ERROR".to_string(),
            QueryError::Stream(_) => "STREAM_ERROR".to_string(),
            QueryError::Bridge(_) => "BRIDGE_ERROR".to_string(),
            QueryError::Aggregation(err) => err.code().to_string(),
        }
    }

    /// Extra diagnostic text, when the error carries any
    pub fn details(&self) -> Option<String> {
        match self {
            QueryError::Aggregation(err) => err.details().map(str::to_string),
            _ => None,
        }
    }
}

/// One error entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorItem {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Uniform failure body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub errors: Vec<ErrorItem>,
}

impl From<&QueryError> for ErrorResponse {
    fn from(err: &QueryError) -> Self {
        Self {
            success: false,
            errors: vec![ErrorItem {
                message: err.to_string(),
                code: Some(err.code()),
                details: err.details(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(QueryError::from(AuthError::AuthenticationRequired).status_code(), 401);
        assert_eq!(
            QueryError::from(AccessError::ReadDenied("Deal".into())).status_code(),
            403
        );
        assert_eq!(QueryError::from(CompileError::InvalidCondition).status_code(), 400);
        assert_eq!(
            QueryError::from(StoreError::UnknownOperator("$where".into())).status_code(),
            400
        );
        assert_eq!(QueryError::from(StoreError::Cursor("x".into())).status_code(), 500);
        assert_eq!(QueryError::UnknownDocument("X".into()).status_code(), 404);
    }

    #[test]
    fn test_error_body() {
        let err = QueryError::from(CompileError::InvalidCondition);
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(
            body["errors"][0]["message"],
            "All conditions must contain term, operator and value"
        );
        assert_eq!(body["errors"][0]["code"], "COMPILE_ERROR");
        assert!(body["errors"][0].get("details").is_none());
    }

    #[test]
    fn test_graph_processing_details() {
        let err = QueryError::from(AggregationError::graph_processing("exit status: 1"));
        assert_eq!(err.status_code(), 500);
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(body["errors"][0]["code"], "GRAPH_PROCESSING_ERROR");
        assert_eq!(body["errors"][0]["details"], "exit status: 1");
    }
}
