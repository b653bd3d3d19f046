//! # Authentication
//!
//! Caller resolution for read queries.
//!
//! # Modules
//! - `errors`: auth error types
//! - `jwt`: signed caller tokens
//! - `user`: the resolved caller
//! - `resolver`: token to caller resolution

pub mod errors;
pub mod jwt;
pub mod resolver;
pub mod user;

pub use errors::{AuthError, AuthResult};
pub use jwt::{CallerClaims, CallerTokens, TokenSettings};
pub use resolver::{
    CallerResolver, ChainedCallerResolver, JwtCallerResolver, StaticCallerResolver, USER_DOCUMENT,
};
pub use user::{AccessGrant, User};
