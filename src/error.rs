//! Crate error types
//!
//! Each component has its own error enum; `Error` wraps them so the pipeline and
//! the delivery surface can report a single type. `Error::is_recoverable`
//! separates operational failures (retry through broker redelivery) from problems
//! the caller has to fix.

use std::io;

use crate::audience::GraphError;
use crate::auth::AuthError;
use crate::broker::BrokerError;
use crate::event::EventError;
use crate::protocol::{ProtocolError, StatusCode};
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failure
    Io(io::Error),
    /// Broker subscription, publish or ack failure
    Broker(BrokerError),
    /// Event payload could not be decoded
    Event(EventError),
    /// Social graph lookup failed
    Audience(GraphError),
    /// Notification store failure
    Store(StoreError),
    /// Caller could not be authenticated
    Auth(AuthError),
    /// Caller is authenticated but not allowed to do this
    PermissionDenied(String),
    /// Wire protocol violation
    Protocol(ProtocolError),
    /// Delivery registry refused a session
    Registry(RegistryError),
    /// A blocking task panicked or was cancelled
    Task(String),
    /// Delivery server answered with a failure status
    Status { code: StatusCode, message: String },
}

impl Error {
    /// Whether retrying the same input later can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io(_) | Error::Task(_) | Error::Audience(_) => true,
            Error::Broker(e) => !matches!(e, BrokerError::Closed),
            Error::Store(e) => e.is_transient(),
            Error::Registry(_) => true,
            Error::Status { code, .. } => {
                matches!(code, StatusCode::Unavailable | StatusCode::ResourceExhausted)
            }
            Error::Event(_) | Error::Auth(_) | Error::PermissionDenied(_) | Error::Protocol(_) => {
                false
            }
        }
    }

    /// Status reported to delivery clients
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Event(_) | Error::Protocol(_) => StatusCode::InvalidArgument,
            Error::Auth(_) => StatusCode::Unauthenticated,
            Error::PermissionDenied(_) => StatusCode::PermissionDenied,
            Error::Store(StoreError::NotFound(_)) => StatusCode::NotFound,
            Error::Registry(RegistryError::Closed) => StatusCode::Unavailable,
            Error::Registry(_) => StatusCode::ResourceExhausted,
            Error::Audience(_) | Error::Broker(_) | Error::Io(_) => StatusCode::Unavailable,
            Error::Store(_) | Error::Task(_) => StatusCode::Internal,
            Error::Status { code, .. } => *code,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Broker(e) => write!(f, "Broker error: {}", e),
            Error::Event(e) => write!(f, "Event error: {}", e),
            Error::Audience(e) => write!(f, "Audience error: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Auth(e) => write!(f, "Auth error: {}", e),
            Error::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Task(msg) => write!(f, "Task error: {}", msg),
            Error::Status { code, message } => write!(f, "Server status {}: {}", code, message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Broker(e) => Some(e),
            Error::Event(e) => Some(e),
            Error::Audience(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::Auth(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::PermissionDenied(_) | Error::Task(_) | Error::Status { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<BrokerError> for Error {
    fn from(e: BrokerError) -> Self {
        Error::Broker(e)
    }
}

impl From<EventError> for Error {
    fn from(e: EventError) -> Self {
        Error::Event(e)
    }
}

impl From<GraphError> for Error {
    fn from(e: GraphError) -> Self {
        Error::Audience(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Task(e.to_string())
    }
}
