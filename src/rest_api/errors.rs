//! # REST API Errors
//!
//! Errors raised before a response starts. Once an NDJSON body is
//! streaming, a failure can only end the connection.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::warn;

use crate::aggregate::AggregationError;
use crate::auth::AuthError;
use crate::errors::{ErrorItem, ErrorResponse, QueryError};
use crate::filter::CompileError;

/// Result type for REST operations
pub type RestResult<T> = Result<T, RestError>;

/// REST API errors
#[derive(Debug, Clone, Error)]
pub enum RestError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Invalid query parameter
    #[error("Invalid query parameter {name}: {message}")]
    InvalidQueryParam { name: &'static str, message: String },

    // ==================
    // Pipeline Errors
    // ==================
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl RestError {
    pub fn invalid_param(name: &'static str, message: impl Into<String>) -> Self {
        RestError::InvalidQueryParam {
            name,
            message: message.into(),
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RestError::InvalidQueryParam { .. } => StatusCode::BAD_REQUEST,
            RestError::Query(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn body(&self) -> ErrorResponse {
        match self {
            RestError::Query(err) => ErrorResponse::from(err),
            RestError::InvalidQueryParam { .. } => ErrorResponse {
                success: false,
                errors: vec![ErrorItem {
                    message: self.to_string(),
                    code: Some("INVALID_PARAMETER".to_string()),
                    details: None,
                }],
            },
        }
    }
}

impl From<AggregationError> for RestError {
    fn from(err: AggregationError) -> Self {
        RestError::Query(err.into())
    }
}

impl From<AuthError> for RestError {
    fn from(err: AuthError) -> Self {
        RestError::Query(err.into())
    }
}

impl From<CompileError> for RestError {
    fn from(err: CompileError) -> Self {
        RestError::Query(err.into())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}
