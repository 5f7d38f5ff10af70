//! Transport-independent delivery surface
//!
//! [`DeliveryService`] is what a transport calls once it has verified the
//! caller. Every operation takes the caller's [`Identity`]; none of them lets a
//! caller act for another user.

use std::sync::Arc;

use crate::auth::Identity;
use crate::error::{Error, Result};
use crate::notification::{Notification, NotificationId, UserId};
use crate::registry::DeliveryRegistry;
use crate::session::Subscription;
use crate::store::{ListQuery, NotificationStore, DEFAULT_PAGE_SIZE};

/// Upper bound on a single page unless configured otherwise
pub const MAX_PAGE_SIZE: u32 = 500;

/// Historical pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRequest {
    /// Whose notifications to list; must be the caller
    pub recipient: UserId,
    /// Only return notifications older than this id
    pub before: Option<NotificationId>,
    /// Page size; the service default applies when absent
    pub limit: Option<u32>,
}

impl ListRequest {
    /// First page for `recipient` with the default size
    pub fn first(recipient: UserId) -> Self {
        Self {
            recipient,
            before: None,
            limit: None,
        }
    }

    pub fn before(mut self, before: NotificationId) -> Self {
        self.before = Some(before);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of history, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub notifications: Vec<Notification>,
    /// Cursor for the next page, `None` when this is the last one
    pub next_before: Option<NotificationId>,
}

/// Subscribe, list and mark-opened for verified callers
pub struct DeliveryService<S> {
    store: Arc<S>,
    registry: Arc<DeliveryRegistry>,
    default_page_size: u32,
    max_page_size: u32,
}

impl<S: NotificationStore> DeliveryService<S> {
    pub fn new(store: Arc<S>, registry: Arc<DeliveryRegistry>) -> Self {
        Self {
            store,
            registry,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Set the default and maximum page sizes
    pub fn page_sizes(mut self, default: u32, max: u32) -> Self {
        // One extra row is fetched past the maximum to detect a next page.
        self.max_page_size = max.clamp(1, u32::MAX - 1);
        self.default_page_size = default.clamp(1, self.max_page_size);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<DeliveryRegistry> {
        &self.registry
    }

    /// Open a live stream of the caller's own notifications
    pub fn subscribe(&self, identity: &Identity) -> Result<Subscription> {
        let subscription = Subscription::open(Arc::clone(&self.registry), identity.user_id)?;
        Ok(subscription)
    }

    /// Fetch one page of the caller's history
    ///
    /// Listing another user's notifications is refused with
    /// [`Error::PermissionDenied`].
    pub async fn list(&self, identity: &Identity, request: ListRequest) -> Result<Page> {
        if request.recipient != identity.user_id {
            tracing::warn!(
                caller = identity.user_id,
                recipient = request.recipient,
                "List refused for another recipient"
            );
            return Err(Error::PermissionDenied(format!(
                "user {} cannot list notifications of user {}",
                identity.user_id, request.recipient
            )));
        }

        let limit = request
            .limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        // One extra row tells us whether another page exists.
        let query = ListQuery {
            before: request.before,
            limit: limit.saturating_add(1),
        };
        let store = Arc::clone(&self.store);
        let recipient = request.recipient;
        let mut notifications =
            tokio::task::spawn_blocking(move || store.fetch_page(recipient, &query)).await??;

        let next_before = if notifications.len() > limit as usize {
            notifications.truncate(limit as usize);
            notifications.last().map(|n| n.id)
        } else {
            None
        };

        Ok(Page {
            notifications,
            next_before,
        })
    }

    /// Set the opened flag of one of the caller's notifications
    ///
    /// A notification addressed to someone else reports `NotFound`, the same as
    /// one that does not exist.
    pub async fn mark_opened(
        &self,
        identity: &Identity,
        id: NotificationId,
        opened: bool,
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        let recipient = identity.user_id;
        tokio::task::spawn_blocking(move || store.mark_opened(id, recipient, opened)).await??;

        tracing::debug!(recipient = recipient, id = id, opened = opened, "Notification marked");
        Ok(())
    }
}

impl<S> Clone for DeliveryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}
