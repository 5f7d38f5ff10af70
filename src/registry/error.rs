//! Registry error types
//!
//! Error types for delivery registry operations.

use crate::notification::UserId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Recipient already holds the maximum number of live sessions
    TooManySessions { recipient: UserId, limit: usize },
    /// Registry has been closed for shutdown
    Closed,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::TooManySessions { recipient, limit } => {
                write!(f, "Recipient {} already has {} live sessions", recipient, limit)
            }
            RegistryError::Closed => write!(f, "Registry closed"),
        }
    }
}

impl std::error::Error for RegistryError {}
