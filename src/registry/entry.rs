//! Per-recipient session table
//!
//! This module defines the per-recipient state stored in the registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::notification::Notification;

/// Registry-unique session identifier
pub type SessionId = u64;

/// One live session's delivery channel
pub(super) struct SessionSlot {
    tx: mpsc::Sender<Arc<Notification>>,
}

/// Result of pushing one notification to one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PushOutcome {
    Delivered,
    /// Buffer full; the consumer is not keeping up
    Lagging,
    /// Receiver dropped without deregistering
    Gone,
}

/// All live sessions of a single recipient
#[derive(Default)]
pub struct RecipientEntry {
    sessions: HashMap<SessionId, SessionSlot>,
}

impl RecipientEntry {
    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the recipient has no live session
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub(super) fn insert(&mut self, id: SessionId, tx: mpsc::Sender<Arc<Notification>>) {
        self.sessions.insert(id, SessionSlot { tx });
    }

    pub(super) fn remove(&mut self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub(super) fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Offer a notification to every session without waiting on any of them
    pub(super) fn push(&self, notification: &Arc<Notification>) -> Vec<(SessionId, PushOutcome)> {
        self.sessions
            .iter()
            .map(|(id, slot)| {
                let outcome = match slot.tx.try_send(Arc::clone(notification)) {
                    Ok(()) => PushOutcome::Delivered,
                    Err(TrySendError::Full(_)) => PushOutcome::Lagging,
                    Err(TrySendError::Closed(_)) => PushOutcome::Gone,
                };
                (*id, outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ContentEvent;
    use crate::notification::NewNotification;

    fn notification() -> Arc<Notification> {
        Arc::new(NewNotification::for_content(&ContentEvent::new(1, 1, "t"), 2).into_notification(1))
    }

    #[test]
    fn test_push_outcomes() {
        let mut entry = RecipientEntry::default();
        let (tx_ok, _rx_ok) = mpsc::channel(4);
        let (tx_full, _rx_full) = mpsc::channel(1);
        let (tx_gone, rx_gone) = mpsc::channel(4);
        drop(rx_gone);

        tx_full.try_send(notification()).unwrap();

        entry.insert(1, tx_ok);
        entry.insert(2, tx_full);
        entry.insert(3, tx_gone);

        let mut outcomes = entry.push(&notification());
        outcomes.sort_by_key(|(id, _)| *id);

        assert_eq!(
            outcomes,
            vec![
                (1, PushOutcome::Delivered),
                (2, PushOutcome::Lagging),
                (3, PushOutcome::Gone),
            ]
        );
    }

    #[test]
    fn test_insert_remove() {
        let mut entry = RecipientEntry::default();
        let (tx, _rx) = mpsc::channel(1);

        entry.insert(7, tx);
        assert!(entry.contains(7));
        assert_eq!(entry.session_count(), 1);

        assert!(entry.remove(7));
        assert!(!entry.remove(7));
        assert!(entry.is_empty());
    }
}
