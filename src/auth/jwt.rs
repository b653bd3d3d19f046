//! # Caller Tokens
//!
//! Signed HS256 tokens whose subject is the `_id` of a `User` document.
//! Verification only proves who the caller is; permissions come from the
//! user record the resolver loads afterwards.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::errors::{AuthError, AuthResult};

/// Issuer and audience written into every caller token
pub const TOKEN_AUDIENCE: &str = "aeroquery";

/// Claims carried by a caller token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerClaims {
    /// `User` record id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub ttl: Duration,
    /// Clock skew tolerated on `exp`, in seconds
    pub leeway: u64,
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::hours(8),
            leeway: 30,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Signs and verifies caller tokens
#[derive(Clone)]
pub struct CallerTokens {
    settings: TokenSettings,
    signing: EncodingKey,
    verifying: DecodingKey,
}

impl CallerTokens {
    pub fn new(settings: TokenSettings) -> Self {
        let key = settings.secret.as_bytes();
        Self {
            signing: EncodingKey::from_secret(key),
            verifying: DecodingKey::from_secret(key),
            settings,
        }
    }

    /// Token for `user_id`; used by tests and operator tooling
    pub fn issue(&self, user_id: &str) -> AuthResult<String> {
        let issued = Utc::now();
        let claims = CallerClaims {
            sub: user_id.to_string(),
            iat: issued.timestamp(),
            exp: (issued + self.settings.ttl).timestamp(),
            aud: TOKEN_AUDIENCE.to_string(),
            iss: TOKEN_AUDIENCE.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.signing)
            .map_err(|_| AuthError::TokenGenerationFailed)
    }

    /// Checks signature, expiry, issuer and audience; returns the claims
    pub fn verify(&self, token: &str) -> AuthResult<CallerClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.settings.leeway;
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[TOKEN_AUDIENCE]);

        let claims = decode::<CallerClaims>(token, &self.verifying, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(AuthError::MalformedToken);
        }
        Ok(claims)
    }
}
