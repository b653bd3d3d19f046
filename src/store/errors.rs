//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    // ==================
    // Query errors
    // ==================
    #[error("Unsupported query operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ==================
    // Source errors
    // ==================
    #[error("Failed to read seed data: {0}")]
    Io(String),

    #[error("Failed to parse seed data: {0}")]
    Parse(String),

    #[error("Cursor failed: {0}")]
    Cursor(String),
}

impl StoreError {
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::UnknownOperator(_) | Self::InvalidQuery(_))
    }
}
