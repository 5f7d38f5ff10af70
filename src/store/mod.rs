//! Durable notification storage
//!
//! The store is written by the pipeline (one atomic batch per event) and read by
//! recipients catching up on what they missed. Reads are always ordered by id,
//! newest first, and page with a keyset cursor (`before`), so a page boundary never
//! shifts when new rows are inserted above it.
//!
//! Store calls are synchronous. Async callers run them on
//! `tokio::task::spawn_blocking`.

pub mod cursor;
pub mod error;
pub mod memory;
pub mod sqlite;

use crate::notification::{NewNotification, Notification, NotificationId, UserId};

pub use cursor::NotificationCursor;
pub use error::StoreError;
pub use memory::MemoryNotificationStore;
pub use sqlite::SqliteNotificationStore;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Default number of rows fetched per page by [`NotificationCursor`]
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// One page request, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    /// Only return rows with an id strictly below this one
    pub before: Option<NotificationId>,
    /// Maximum rows to return
    pub limit: u32,
}

impl ListQuery {
    /// First page of `limit` rows
    pub fn first(limit: u32) -> Self {
        Self {
            before: None,
            limit,
        }
    }

    /// Page of `limit` rows older than `before`
    pub fn before(before: NotificationId, limit: u32) -> Self {
        Self {
            before: Some(before),
            limit,
        }
    }
}

/// Persistence for notifications
pub trait NotificationStore: Send + Sync + 'static {
    /// Insert all rows in one atomic write and return their ids in input order
    ///
    /// Either every row is committed or none is.
    fn bulk_create(&self, batch: &[NewNotification]) -> StoreResult<Vec<NotificationId>>;

    /// Fetch one page of a recipient's notifications, descending by id
    fn fetch_page(&self, recipient: UserId, query: &ListQuery) -> StoreResult<Vec<Notification>>;

    /// Look up a single notification
    fn get(&self, id: NotificationId) -> StoreResult<Option<Notification>>;

    /// Set the opened flag of a recipient's notification
    fn mark_opened(&self, id: NotificationId, recipient: UserId, opened: bool) -> StoreResult<()>;

    /// Number of notifications stored for a recipient
    fn count_for(&self, recipient: UserId) -> StoreResult<u64>;

    /// Insert a single row
    fn create(&self, notification: &NewNotification) -> StoreResult<NotificationId> {
        let ids = self.bulk_create(std::slice::from_ref(notification))?;
        match ids.as_slice() {
            [id] => Ok(*id),
            _ => Err(StoreError::IdMismatch {
                expected: 1,
                actual: ids.len(),
            }),
        }
    }

    /// Lazily walk every notification of a recipient, newest first
    fn list(&self, recipient: UserId) -> NotificationCursor<'_, Self>
    where
        Self: Sized,
    {
        NotificationCursor::new(self, recipient, DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_constructors() {
        assert_eq!(
            ListQuery::first(10),
            ListQuery {
                before: None,
                limit: 10
            }
        );
        assert_eq!(ListQuery::before(5, 2).before, Some(5));
    }
}
