//! Delivery registry implementation
//!
//! The central table of live sessions. The pipeline broadcasts persisted
//! notifications into it; sessions drain their own bounded channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use crate::notification::{Notification, UserId};
use crate::stats::{RegistrySnapshot, RegistryStats};

use super::config::RegistryConfig;
use super::entry::{PushOutcome, RecipientEntry, SessionId};
use super::error::RegistryError;

/// Receiving half handed to a newly registered session
pub type SessionReceiver = mpsc::Receiver<Arc<Notification>>;

/// Registry of live delivery sessions, keyed by recipient
///
/// Guarded by a single `RwLock`. Broadcasting takes the read lock and only
/// uses `try_send`, so it never waits on a consumer; register and deregister
/// take the write lock. The lock is a std lock so sessions can deregister
/// from `Drop`.
pub struct DeliveryRegistry {
    /// Map of recipient to its live sessions
    recipients: RwLock<HashMap<UserId, RecipientEntry>>,

    /// Configuration
    config: RegistryConfig,

    next_session_id: AtomicU64,
    closed: AtomicBool,
    stats: RegistryStats,
}

impl DeliveryRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            recipients: RwLock::new(HashMap::new()),
            config,
            next_session_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            stats: RegistryStats::new(),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, RecipientEntry>> {
        self.recipients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, RecipientEntry>> {
        self.recipients.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new live session for `recipient`
    ///
    /// Returns the session id and the channel the session reads from.
    pub fn register(
        &self,
        recipient: UserId,
    ) -> Result<(SessionId, SessionReceiver), RegistryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }

        let mut recipients = self.write();
        // `close` sets the flag before draining under this lock.
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        let entry = recipients.entry(recipient).or_default();

        let limit = self.config.max_sessions_per_recipient;
        if limit > 0 && entry.session_count() >= limit {
            tracing::warn!(
                recipient = recipient,
                limit = limit,
                "Session rejected: per-recipient limit reached"
            );
            return Err(RegistryError::TooManySessions { recipient, limit });
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.session_buffer);
        entry.insert(session_id, tx);
        self.stats.record_opened();

        tracing::info!(
            recipient = recipient,
            session_id = session_id,
            sessions = entry.session_count(),
            "Session registered"
        );

        Ok((session_id, rx))
    }

    /// Remove a session. Returns false if it was not registered.
    pub fn deregister(&self, recipient: UserId, session_id: SessionId) -> bool {
        let mut recipients = self.write();

        let removed = match recipients.get_mut(&recipient) {
            Some(entry) => {
                let removed = entry.remove(session_id);
                if entry.is_empty() {
                    recipients.remove(&recipient);
                }
                removed
            }
            None => false,
        };

        if removed {
            self.stats.record_closed();
            tracing::debug!(
                recipient = recipient,
                session_id = session_id,
                "Session deregistered"
            );
        }

        removed
    }

    /// Push a notification to every live session of its recipient
    ///
    /// Returns the number of sessions that accepted it. Sessions whose buffer is
    /// full or whose receiver is gone are removed; dropping their sender ends the
    /// session once it drains what it already has.
    pub fn broadcast(&self, notification: &Arc<Notification>) -> usize {
        let recipient = notification.recipient_user_id;

        let outcomes = {
            let recipients = self.read();
            match recipients.get(&recipient) {
                Some(entry) => entry.push(notification),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (session_id, outcome) in outcomes {
            match outcome {
                PushOutcome::Delivered => delivered += 1,
                PushOutcome::Lagging => {
                    tracing::warn!(
                        recipient = recipient,
                        session_id = session_id,
                        notification_id = notification.id,
                        "Session buffer full, evicting slow consumer"
                    );
                    if self.deregister(recipient, session_id) {
                        self.stats.record_evicted();
                    }
                }
                PushOutcome::Gone => {
                    self.deregister(recipient, session_id);
                }
            }
        }

        self.stats.record_delivered(delivered as u64);
        delivered
    }

    /// Whether a session is still registered
    pub fn is_registered(&self, recipient: UserId, session_id: SessionId) -> bool {
        self.read()
            .get(&recipient)
            .map_or(false, |entry| entry.contains(session_id))
    }

    /// Number of live sessions for a recipient
    pub fn session_count(&self, recipient: UserId) -> usize {
        self.read()
            .get(&recipient)
            .map_or(0, RecipientEntry::session_count)
    }

    /// Number of recipients with at least one live session
    pub fn recipient_count(&self) -> usize {
        self.read().len()
    }

    /// Counters plus current table size
    pub fn stats(&self) -> RegistrySnapshot {
        let recipients = self.read();
        let sessions = recipients.values().map(RecipientEntry::session_count).sum();
        self.stats.snapshot(recipients.len(), sessions)
    }

    /// Refuse new sessions and drop every live one
    ///
    /// Sessions observe the close as the end of their channel.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let drained: Vec<_> = self.write().drain().collect();
        let sessions: usize = drained.iter().map(|(_, e)| e.session_count()).sum();
        for _ in 0..sessions {
            self.stats.record_closed();
        }

        tracing::info!(sessions = sessions, "Registry closed");
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for DeliveryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ContentEvent;
    use crate::notification::NewNotification;

    fn notification(id: i64, recipient: UserId) -> Arc<Notification> {
        Arc::new(
            NewNotification::for_content(&ContentEvent::new(1, id, format!("n{}", id)), recipient)
                .into_notification(id),
        )
    }

    #[tokio::test]
    async fn test_register_and_broadcast() {
        let registry = DeliveryRegistry::new();

        let (_id, mut rx) = registry.register(2).unwrap();
        assert_eq!(registry.broadcast(&notification(1, 2)), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, 1);
        assert_eq!(received.recipient_user_id, 2);
    }

    #[tokio::test]
    async fn test_broadcast_only_reaches_recipient() {
        let registry = DeliveryRegistry::new();

        let (_a, mut rx_a) = registry.register(2).unwrap();
        let (_b, mut rx_b) = registry.register(3).unwrap();

        registry.broadcast(&notification(1, 3));

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.recv().await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_multiple_sessions_each_receive() {
        let registry = DeliveryRegistry::new();

        let (_a, mut rx_a) = registry.register(2).unwrap();
        let (_b, mut rx_b) = registry.register(2).unwrap();

        assert_eq!(registry.broadcast(&notification(1, 2)), 2);
        assert_eq!(registry.broadcast(&notification(2, 2)), 2);

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.recv().await.unwrap().id, 1);
            assert_eq!(rx.recv().await.unwrap().id, 2);
        }
    }

    #[test]
    fn test_broadcast_without_sessions() {
        let registry = DeliveryRegistry::new();
        assert_eq!(registry.broadcast(&notification(1, 2)), 0);
    }

    #[test]
    fn test_deregister() {
        let registry = DeliveryRegistry::new();

        let (a, _rx_a) = registry.register(2).unwrap();
        let (b, _rx_b) = registry.register(2).unwrap();
        assert_eq!(registry.session_count(2), 2);

        assert!(registry.deregister(2, a));
        assert!(!registry.deregister(2, a));
        assert!(registry.is_registered(2, b));
        assert_eq!(registry.recipient_count(), 1);

        assert!(registry.deregister(2, b));
        assert_eq!(registry.recipient_count(), 0);
    }

    #[test]
    fn test_slow_consumer_evicted() {
        let registry = DeliveryRegistry::with_config(RegistryConfig::default().session_buffer(1));

        let (slow, _rx_slow) = registry.register(2).unwrap();
        let (fast, mut rx_fast) = registry.register(2).unwrap();

        assert_eq!(registry.broadcast(&notification(1, 2)), 2);
        assert_eq!(rx_fast.try_recv().unwrap().id, 1);

        // slow never drained its single slot
        assert_eq!(registry.broadcast(&notification(2, 2)), 1);
        assert!(!registry.is_registered(2, slow));
        assert!(registry.is_registered(2, fast));
        assert_eq!(registry.stats().evicted, 1);
    }

    #[test]
    fn test_dropped_receiver_removed_on_broadcast() {
        let registry = DeliveryRegistry::new();

        let (id, rx) = registry.register(2).unwrap();
        drop(rx);

        assert_eq!(registry.broadcast(&notification(1, 2)), 0);
        assert!(!registry.is_registered(2, id));
    }

    #[test]
    fn test_session_limit() {
        let registry =
            DeliveryRegistry::with_config(RegistryConfig::default().max_sessions_per_recipient(1));

        let _first = registry.register(2).unwrap();
        assert_eq!(
            registry.register(2).unwrap_err(),
            RegistryError::TooManySessions {
                recipient: 2,
                limit: 1
            }
        );
        assert!(registry.register(3).is_ok());
    }

    #[tokio::test]
    async fn test_close_ends_sessions() {
        let registry = DeliveryRegistry::new();
        let (_id, mut rx) = registry.register(2).unwrap();

        registry.close();

        assert!(rx.recv().await.is_none());
        assert_eq!(registry.register(2).unwrap_err(), RegistryError::Closed);
        assert_eq!(registry.stats().sessions, 0);
    }

    #[test]
    fn test_register_racing_close_leaves_nothing_behind() {
        let registry = Arc::new(DeliveryRegistry::with_config(
            RegistryConfig::default().max_sessions_per_recipient(0),
        ));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut receivers = Vec::new();
                    for _ in 0..20_000 {
                        match registry.register(t) {
                            Ok((_id, rx)) => receivers.push(rx),
                            Err(_) => break,
                        }
                    }
                    receivers
                })
            })
            .collect();

        std::thread::sleep(std::time::Duration::from_millis(1));
        registry.close();

        for handle in handles {
            for mut rx in handle.join().unwrap() {
                // Every session that got in was drained by close
                assert!(matches!(
                    rx.try_recv(),
                    Err(mpsc::error::TryRecvError::Disconnected)
                ));
            }
        }
        assert_eq!(registry.stats().sessions, 0);
        assert_eq!(registry.recipient_count(), 0);
    }

    #[test]
    fn test_concurrent_register_and_broadcast() {
        let registry = Arc::new(DeliveryRegistry::with_config(
            RegistryConfig::default()
                .session_buffer(1024)
                .max_sessions_per_recipient(0),
        ));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let (id, _rx) = registry.register(2).unwrap();
                        registry.broadcast(&notification(t * 1000 + i, 2));
                        assert!(registry.deregister(2, id));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = registry.stats();
        assert_eq!(stats.sessions, 0);
        assert_eq!(stats.opened, 800);
        assert_eq!(stats.closed, 800);
    }
}
