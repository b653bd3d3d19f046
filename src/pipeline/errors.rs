//! Stream error types

use thiserror::Error;

use crate::filter::ConditionError;
use crate::store::StoreError;

/// A failure after streaming has begun; it terminates the stream
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A field condition could not be evaluated
    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error("Failed to populate [{field}]: {message}")]
    Populate { field: String, message: String },

    #[error("Failed to encode record: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Encode(err.to_string())
    }
}
