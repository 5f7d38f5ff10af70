//! Wire protocol errors

use std::io;

/// Error type for framing and message decoding
#[derive(Debug)]
pub enum ProtocolError {
    /// Socket read or write failed
    Io(io::Error),
    /// Declared or encoded frame body exceeds the configured maximum
    FrameTooLarge { len: usize, max: usize },
    /// Frame body is not a valid message
    Malformed(serde_json::Error),
    /// Peer closed the connection in the middle of a frame
    UnexpectedEof,
    /// Well-formed message that is not valid at this point of the exchange
    UnexpectedMessage(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
            ProtocolError::FrameTooLarge { len, max } => {
                write!(f, "Frame of {} bytes exceeds maximum of {}", len, max)
            }
            ProtocolError::Malformed(e) => write!(f, "Malformed message: {}", e),
            ProtocolError::UnexpectedEof => write!(f, "Connection closed mid-frame"),
            ProtocolError::UnexpectedMessage(msg) => write!(f, "Unexpected message: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            ProtocolError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Malformed(e)
    }
}
