//! # Filter Errors
//!
//! Structured compile failures. Every filter entry point returns these
//! instead of panicking.

use thiserror::Error;

/// Result type for filter compilation
pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Missing term, operator outside the whitelist, or absent value
    #[error("All conditions must contain term, operator and value")]
    InvalidCondition,

    #[error("Field [{term}] does not exists at [{document}]")]
    UnknownField { term: String, document: String },

    #[error("Document [{0}] not found")]
    UnknownDocument(String),

    #[error("Field type [{field_type}] of [{field}] not supported to filter")]
    UnsupportedType { field_type: String, field: String },

    #[error("Field [{term}] only supports operators [{allowed}]. Trying to use operator [{operator}]")]
    UnsupportedOperator {
        term: String,
        operator: String,
        allowed: String,
    },

    #[error("Invalid value for [{term}]: {reason}")]
    InvalidValue { term: String, reason: String },

    #[error("Invalid sort: {0}")]
    InvalidSort(String),
}

impl CompileError {
    pub fn invalid_value(term: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            term: term.to_string(),
            reason: reason.into(),
        }
    }
}

/// A per-record condition could not be evaluated
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Condition on [{term}] failed: {message}")]
pub struct ConditionError {
    pub term: String,
    pub message: String,
}
