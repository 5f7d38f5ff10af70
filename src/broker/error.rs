//! Broker error types

/// Error type for broker operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Broker has been shut down
    Closed,
    /// Subject name is empty or contains whitespace
    InvalidSubject(String),
    /// Durable name is empty
    InvalidDurableName,
    /// Sequence was never delivered to this durable subscription
    UnknownSequence(u64),
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::Closed => write!(f, "Broker closed"),
            BrokerError::InvalidSubject(subject) => write!(f, "Invalid subject: {:?}", subject),
            BrokerError::InvalidDurableName => write!(f, "Durable name must not be empty"),
            BrokerError::UnknownSequence(seq) => write!(f, "Unknown sequence: {}", seq),
        }
    }
}

impl std::error::Error for BrokerError {}
