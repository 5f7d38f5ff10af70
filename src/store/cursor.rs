//! Lazy, restartable reads over a recipient's notifications

use std::collections::VecDeque;

use crate::notification::{Notification, NotificationId, UserId};

use super::{ListQuery, NotificationStore, StoreResult};

/// Iterator over one recipient's notifications, newest first
///
/// Pages are fetched on demand. The sequence ends after the first short page or
/// after an error (which is yielded once). [`rewind`](Self::rewind) starts over
/// from the newest row.
pub struct NotificationCursor<'a, S: NotificationStore + ?Sized> {
    store: &'a S,
    recipient: UserId,
    page_size: u32,
    before: Option<NotificationId>,
    buffer: VecDeque<Notification>,
    exhausted: bool,
}

impl<'a, S: NotificationStore + ?Sized> NotificationCursor<'a, S> {
    /// Create a cursor fetching `page_size` rows at a time
    pub fn new(store: &'a S, recipient: UserId, page_size: u32) -> Self {
        Self {
            store,
            recipient,
            page_size: page_size.max(1),
            before: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Recipient being listed
    pub fn recipient(&self) -> UserId {
        self.recipient
    }

    /// Restart from the newest notification
    pub fn rewind(&mut self) {
        self.before = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fill(&mut self) -> StoreResult<()> {
        let query = ListQuery {
            before: self.before,
            limit: self.page_size,
        };
        let page = self.store.fetch_page(self.recipient, &query)?;

        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.before = Some(last.id);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<S: NotificationStore + ?Sized> Iterator for NotificationCursor<'_, S> {
    type Item = StoreResult<Notification>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(notification) = self.buffer.pop_front() {
            return Some(Ok(notification));
        }
        if self.exhausted {
            return None;
        }

        if let Err(e) = self.fill() {
            self.exhausted = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}
