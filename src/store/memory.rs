//! In-memory notification store

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::notification::{NewNotification, Notification, NotificationId, UserId};

use super::{ListQuery, NotificationStore, StoreError, StoreResult};

#[derive(Default)]
struct Rows {
    /// Ordered by id ascending
    rows: Vec<Notification>,
    last_id: NotificationId,
}

/// Notification store kept in process memory
///
/// Ids start at 1 and grow with insertion order. A batch is appended under a
/// single write lock, so readers see all of it or none of it.
#[derive(Default)]
pub struct MemoryNotificationStore {
    inner: RwLock<Rows>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows
    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored row in insertion order
    pub fn all(&self) -> Vec<Notification> {
        self.read().rows.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Rows> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Rows> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NotificationStore for MemoryNotificationStore {
    fn bulk_create(&self, batch: &[NewNotification]) -> StoreResult<Vec<NotificationId>> {
        let mut inner = self.write();
        let mut ids = Vec::with_capacity(batch.len());

        for draft in batch {
            inner.last_id += 1;
            let id = inner.last_id;
            inner.rows.push(draft.clone().into_notification(id));
            ids.push(id);
        }

        Ok(ids)
    }

    fn fetch_page(&self, recipient: UserId, query: &ListQuery) -> StoreResult<Vec<Notification>> {
        let inner = self.read();
        Ok(inner
            .rows
            .iter()
            .rev()
            .filter(|n| n.recipient_user_id == recipient)
            .filter(|n| query.before.map_or(true, |before| n.id < before))
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    fn get(&self, id: NotificationId) -> StoreResult<Option<Notification>> {
        let inner = self.read();
        Ok(inner
            .rows
            .binary_search_by_key(&id, |n| n.id)
            .ok()
            .map(|index| inner.rows[index].clone()))
    }

    fn mark_opened(&self, id: NotificationId, recipient: UserId, opened: bool) -> StoreResult<()> {
        let mut inner = self.write();
        let index = inner
            .rows
            .binary_search_by_key(&id, |n| n.id)
            .map_err(|_| StoreError::NotFound(id))?;

        let row = &mut inner.rows[index];
        if row.recipient_user_id != recipient {
            return Err(StoreError::NotFound(id));
        }
        row.opened = opened;
        Ok(())
    }

    fn count_for(&self, recipient: UserId) -> StoreResult<u64> {
        Ok(self
            .read()
            .rows
            .iter()
            .filter(|n| n.recipient_user_id == recipient)
            .count() as u64)
    }
}
