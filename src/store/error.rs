//! Store error types

use crate::notification::NotificationId;

/// Error type for notification store operations
#[derive(Debug)]
pub enum StoreError {
    /// SQLite reported an error
    Sqlite(rusqlite::Error),
    /// No notification with this id for the requesting recipient
    NotFound(NotificationId),
    /// A persisted row could not be mapped back into a notification
    InvalidData(String),
    /// Store returned a different number of ids than rows written
    IdMismatch { expected: usize, actual: usize },
    /// Store is temporarily unusable
    Unavailable(String),
}

impl StoreError {
    /// Whether the same write can succeed if retried later
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy)
                    | Some(rusqlite::ErrorCode::DatabaseLocked)
                    | Some(rusqlite::ErrorCode::DiskFull)
                    | Some(rusqlite::ErrorCode::SystemIoFailure)
            ),
            StoreError::Unavailable(_) | StoreError::IdMismatch { .. } => true,
            StoreError::NotFound(_) | StoreError::InvalidData(_) => false,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {}", e),
            StoreError::NotFound(id) => write!(f, "Notification not found: {}", id),
            StoreError::InvalidData(msg) => write!(f, "Invalid persisted notification: {}", msg),
            StoreError::IdMismatch { expected, actual } => {
                write!(f, "Expected {} ids from bulk insert, got {}", expected, actual)
            }
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}
