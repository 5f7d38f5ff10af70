//! Durable publish/subscribe transport
//!
//! The content service publishes events to a named subject; the notification
//! pipeline reads them through a *durable* subscription whose position survives
//! restarts. A message stays pending until it is acknowledged, and pending
//! messages are redelivered after the broker's ack-wait or when the durable
//! subscription is re-opened.
//!
//! ```text
//!   publish("tweets", payload) ──► [ 1 | 2 | 3 | 4 | ... ]   subject log
//!                                        │
//!                       durable "notification-service"
//!                        next = 5, pending = {3, 4}
//!                                        │
//!                         next_message() ─► Delivery { sequence: 3, redelivered }
//!                         ack(3)         ─► pending = {4}
//! ```

pub mod error;
pub mod memory;

use std::future::Future;

use bytes::Bytes;

pub use error::BrokerError;
pub use memory::{MemoryAcknowledger, MemoryBroker, MemoryBrokerConfig, MemorySubscription};

/// A message handed to a durable subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Position in the subject log, starting at 1
    pub sequence: u64,
    /// Subject the message was published on
    pub subject: String,
    /// Raw payload (reference counted, cheap to clone)
    pub payload: Bytes,
    /// Whether this sequence was delivered before without an ack
    pub redelivered: bool,
}

/// Acknowledges deliveries of one durable subscription
///
/// Split from the subscription so the reader and the worker that finishes
/// processing can live on different tasks.
pub trait Acknowledger: Clone + Send + Sync + 'static {
    /// Mark `sequence` as processed. Acking an already acked sequence is a no-op.
    fn ack(&self, sequence: u64) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// An open durable subscription
pub trait DurableSubscription: Send + 'static {
    type Ack: Acknowledger;

    /// Handle used to acknowledge deliveries from this subscription
    fn acknowledger(&self) -> Self::Ack;

    /// Wait for the next delivery. Returns `None` once the broker is closed.
    fn next_message(&mut self) -> impl Future<Output = Option<Delivery>> + Send;
}

/// A subject-addressed durable broker
pub trait Broker: Send + Sync + 'static {
    type Subscription: DurableSubscription;

    /// Open (or resume) the durable subscription `durable_name` on `subject`
    fn subscribe_durable(
        &self,
        subject: &str,
        durable_name: &str,
    ) -> impl Future<Output = Result<Self::Subscription, BrokerError>> + Send;

    /// Append a message to `subject`. Resolves once it is in the durable log.
    fn publish(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<u64, BrokerError>> + Send;
}

pub(crate) fn validate_subject(subject: &str) -> Result<(), BrokerError> {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(BrokerError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}
