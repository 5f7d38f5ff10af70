//! Counters for the ingress worker and the delivery registry

use std::sync::atomic::{AtomicU64, Ordering};

/// Event ingress counters
///
/// Updated by the reader and worker tasks; read with [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct IngressStats {
    received: AtomicU64,
    redelivered: AtomicU64,
    malformed: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    acked: AtomicU64,
}

/// Point-in-time copy of [`IngressStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressSnapshot {
    /// Deliveries read from the broker
    pub received: u64,
    /// Deliveries the broker flagged as redelivered
    pub redelivered: u64,
    /// Payloads that failed to decode and were skipped
    pub malformed: u64,
    /// Events the pipeline finished
    pub processed: u64,
    /// Events the pipeline failed and left for redelivery
    pub failed: u64,
    /// Successful broker acknowledgements
    pub acked: u64,
}

impl IngressStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self, redelivered: bool) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if redelivered {
            self.redelivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> IngressSnapshot {
        IngressSnapshot {
            received: self.received.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
        }
    }
}

/// Delivery registry counters
#[derive(Debug, Default)]
pub struct RegistryStats {
    opened: AtomicU64,
    closed: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Recipients with at least one live session
    pub recipients: usize,
    /// Live sessions across all recipients
    pub sessions: usize,
    /// Sessions ever registered
    pub opened: u64,
    /// Sessions ever removed, including evictions
    pub closed: u64,
    /// Notifications handed to a session buffer
    pub delivered: u64,
    /// Sessions removed because they could not take more notifications
    pub evicted: u64,
}

impl RegistryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_opened(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, count: u64) {
        self.delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Combine the counters with the current table size
    pub fn snapshot(&self, recipients: usize, sessions: usize) -> RegistrySnapshot {
        RegistrySnapshot {
            recipients,
            sessions,
            opened: self.opened.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingress_stats_new() {
        let stats = IngressStats::new();
        assert_eq!(stats.snapshot(), IngressSnapshot::default());
    }

    #[test]
    fn test_ingress_stats_counts() {
        let stats = IngressStats::new();
        stats.record_received(false);
        stats.record_received(true);
        stats.record_malformed();
        stats.record_processed();
        stats.record_failed();
        stats.record_acked();
        stats.record_acked();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.redelivered, 1);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.acked, 2);
    }

    #[test]
    fn test_registry_snapshot() {
        let stats = RegistryStats::new();
        stats.record_opened();
        stats.record_opened();
        stats.record_closed();
        stats.record_delivered(5);
        stats.record_evicted();

        let snap = stats.snapshot(1, 1);
        assert_eq!(snap.recipients, 1);
        assert_eq!(snap.sessions, 1);
        assert_eq!(snap.opened, 2);
        assert_eq!(snap.closed, 1);
        assert_eq!(snap.delivered, 5);
        assert_eq!(snap.evicted, 1);
    }
}
