//! # Caller Resolution
//!
//! Turns a request token into a [`User`]. The pipeline only depends on the
//! [`CallerResolver`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::errors::{AuthError, AuthResult};
use super::jwt::CallerTokens;
use super::user::User;
use crate::store::DocumentStore;

/// Document holding user records
pub const USER_DOCUMENT: &str = "User";

/// Resolves the caller of a request
#[async_trait]
pub trait CallerResolver: Send + Sync {
    async fn resolve(&self, token: Option<&str>) -> AuthResult<User>;
}

/// Fixed token table
#[derive(Debug, Default, Clone)]
pub struct StaticCallerResolver {
    users: HashMap<String, User>,
}

impl StaticCallerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, user: User) -> Self {
        self.users.insert(token.into(), user);
        self
    }
}

#[async_trait]
impl CallerResolver for StaticCallerResolver {
    async fn resolve(&self, token: Option<&str>) -> AuthResult<User> {
        let token = token.ok_or(AuthError::AuthenticationRequired)?;
        self.users
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Validates a JWT and loads its subject from the `User` document
pub struct JwtCallerResolver {
    tokens: CallerTokens,
    store: Arc<dyn DocumentStore>,
}

impl JwtCallerResolver {
    pub fn new(tokens: CallerTokens, store: Arc<dyn DocumentStore>) -> Self {
        Self { tokens, store }
    }
}

#[async_trait]
impl CallerResolver for JwtCallerResolver {
    async fn resolve(&self, token: Option<&str>) -> AuthResult<User> {
        let token = token.ok_or(AuthError::AuthenticationRequired)?;
        let claims = self.tokens.verify(token)?;

        let record = self
            .store
            .find_by_id(USER_DOCUMENT, &claims.sub)
            .await
            .map_err(|e| AuthError::StorageError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;

        debug!(user_id = %claims.sub, "caller resolved");
        User::from_record(record)
    }
}

/// Chains resolvers, returning the first success
pub struct ChainedCallerResolver {
    resolvers: Vec<Arc<dyn CallerResolver>>,
}

impl ChainedCallerResolver {
    pub fn new(resolvers: Vec<Arc<dyn CallerResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl CallerResolver for ChainedCallerResolver {
    async fn resolve(&self, token: Option<&str>) -> AuthResult<User> {
        let mut last = AuthError::AuthenticationRequired;
        for resolver in &self.resolvers {
            match resolver.resolve(token).await {
                Ok(user) => return Ok(user),
                Err(err) => last = err,
            }
        }
        Err(last)
    }
}
