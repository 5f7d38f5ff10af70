//! Caller identity
//!
//! Token issuance lives in the identity service. This crate only needs to turn a
//! bearer token into a verified `Identity`, which is what scopes a subscription.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::notification::UserId;

/// Error verifying a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token was supplied
    MissingToken,
    /// Token is unknown, expired or malformed
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Access token not provided"),
            AuthError::InvalidToken => write!(f, "Access token not valid"),
        }
    }
}

impl std::error::Error for AuthError {}

/// A verified caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Authenticated user
    pub user_id: UserId,
    /// Token the identity was verified from
    pub token: String,
}

impl Identity {
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
        }
    }
}

/// Verifies bearer tokens on behalf of the identity service
pub trait TokenVerifier: Send + Sync + 'static {
    /// Resolve a token into the identity it was issued to
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Verifier backed by an in-memory token table
///
/// Useful for tests and single-process deployments where tokens are provisioned
/// out of band.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `token` resolve to `user_id`
    pub fn issue(&self, token: impl Into<String>, user_id: UserId) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user_id);
    }

    /// Invalidate a token. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        tokens
            .get(token)
            .map(|user_id| Identity::new(*user_id, token))
            .ok_or(AuthError::InvalidToken)
    }
}
