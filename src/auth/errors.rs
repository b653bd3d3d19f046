//! Caller resolution errors.

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Request carried neither an `Authorization` header nor the token cookie
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token not known to any resolver
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Token subject has no `User` record
    #[error("User not found")]
    UserNotFound,

    #[error("Invalid user record: {0}")]
    InvalidUser(String),

    #[error("Internal error: token generation failed")]
    TokenGenerationFailed,

    /// The `User` lookup itself failed
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl AuthError {
    /// 401 for anything the caller can fix by sending another token
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidUser(_)
            | AuthError::TokenGenerationFailed
            | AuthError::StorageError(_) => 500,
            _ => 401,
        }
    }
}
