//! Access error types

use thiserror::Error;

use crate::filter::CompileError;

/// Result type for access resolution
pub type AccessResult<T> = Result<T, AccessError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("[{0}] You don't have permission read records")]
    ReadDenied(String),

    #[error("[{0}] You don't have permission to aggregate records")]
    AggregateDenied(String),

    /// A READ condition failed to compile
    #[error(transparent)]
    Condition(#[from] CompileError),
}

impl AccessError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ReadDenied(_) | Self::AggregateDenied(_) => 403,
            Self::Condition(_) => 400,
        }
    }
}
