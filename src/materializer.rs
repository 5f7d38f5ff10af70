//! Notification materialization
//!
//! Turns one event plus its resolved audience into persisted rows. All rows of
//! an event are written in a single atomic bulk insert.

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::event::ContentEvent;
use crate::notification::{NewNotification, Notification, UserId};
use crate::store::{NotificationStore, StoreError};

/// Builds and stores the rows for an event
pub struct NotificationMaterializer<S> {
    store: Arc<S>,
}

impl<S: NotificationStore> NotificationMaterializer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// One unopened row per recipient, in audience order
    pub fn build_batch(event: &ContentEvent, audience: &[UserId]) -> Vec<NewNotification> {
        audience
            .iter()
            .map(|recipient| NewNotification::for_content(event, *recipient))
            .collect()
    }

    /// Persist the rows for `audience` and return them with their ids
    ///
    /// An empty audience writes nothing.
    pub async fn materialize(
        &self,
        event: &ContentEvent,
        audience: &[UserId],
    ) -> Result<Vec<Notification>> {
        if audience.is_empty() {
            return Ok(Vec::new());
        }

        let batch = Self::build_batch(event, audience);
        let store = Arc::clone(&self.store);
        let started_at = Instant::now();

        let (batch, ids) = tokio::task::spawn_blocking(move || {
            let ids = store.bulk_create(&batch);
            (batch, ids)
        })
        .await?;
        let ids = ids?;

        if ids.len() != batch.len() {
            return Err(StoreError::IdMismatch {
                expected: batch.len(),
                actual: ids.len(),
            }
            .into());
        }

        tracing::debug!(
            origin = event.origin_user_id,
            content_id = event.content_id,
            rows = ids.len(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "Notifications stored"
        );

        Ok(batch
            .into_iter()
            .zip(ids)
            .map(|(draft, id)| draft.into_notification(id))
            .collect())
    }
}

impl<S> Clone for NotificationMaterializer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::notification::{NotificationId, NotificationType};
    use crate::store::{ListQuery, MemoryNotificationStore, StoreResult};

    /// Store that reports fewer ids than rows
    struct ShortStore;

    impl NotificationStore for ShortStore {
        fn bulk_create(&self, _batch: &[NewNotification]) -> StoreResult<Vec<NotificationId>> {
            Ok(vec![1])
        }
        fn fetch_page(&self, _: UserId, _: &ListQuery) -> StoreResult<Vec<Notification>> {
            Ok(Vec::new())
        }
        fn get(&self, _: NotificationId) -> StoreResult<Option<Notification>> {
            Ok(None)
        }
        fn mark_opened(&self, id: NotificationId, _: UserId, _: bool) -> StoreResult<()> {
            Err(StoreError::NotFound(id))
        }
        fn count_for(&self, _: UserId) -> StoreResult<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_build_batch() {
        let event = ContentEvent::new(1, 42, "hello");
        let batch = NotificationMaterializer::<MemoryNotificationStore>::build_batch(&event, &[2, 3]);

        assert_eq!(batch.len(), 2);
        for (draft, recipient) in batch.iter().zip([2, 3]) {
            assert_eq!(draft.recipient_user_id, recipient);
            assert_eq!(draft.origin_user_id, 1);
            assert_eq!(draft.kind, NotificationType::Content);
            assert_eq!(draft.type_id, 42);
            assert_eq!(draft.title, "hello");
            assert!(!draft.opened);
        }
    }

    #[tokio::test]
    async fn test_materialize_assigns_ids() {
        let store = Arc::new(MemoryNotificationStore::new());
        let materializer = NotificationMaterializer::new(Arc::clone(&store));

        let rows = materializer
            .materialize(&ContentEvent::new(1, 42, "hello"), &[2, 3, 4])
            .await
            .unwrap();

        let ids: Vec<_> = rows.iter().map(|n| n.id).collect();
        let recipients: Vec<_> = rows.iter().map(|n| n.recipient_user_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(recipients, vec![2, 3, 4]);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_audience_writes_nothing() {
        let store = Arc::new(MemoryNotificationStore::new());
        let materializer = NotificationMaterializer::new(Arc::clone(&store));

        let rows = materializer
            .materialize(&ContentEvent::new(1, 42, "hello"), &[])
            .await
            .unwrap();

        assert!(rows.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_id_count_mismatch_fails() {
        let materializer = NotificationMaterializer::new(Arc::new(ShortStore));
        let result = materializer
            .materialize(&ContentEvent::new(1, 42, "hello"), &[2, 3])
            .await;

        assert!(matches!(
            result,
            Err(Error::Store(StoreError::IdMismatch {
                expected: 2,
                actual: 1
            }))
        ));
    }
}
