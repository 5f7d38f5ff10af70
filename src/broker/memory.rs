//! In-process durable broker
//!
//! Keeps an append-only log per subject and a cursor plus a pending set per
//! durable name. Durable state outlives the subscription handle, so dropping a
//! subscription and opening it again resumes where it left off and redelivers
//! everything that was never acknowledged.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::watch;

use super::error::BrokerError;
use super::{validate_subject, Acknowledger, Broker, Delivery, DurableSubscription};

/// Configuration for [`MemoryBroker`]
#[derive(Debug, Clone)]
pub struct MemoryBrokerConfig {
    /// How long a delivered message may stay unacknowledged before redelivery
    pub ack_wait: Duration,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(30),
        }
    }
}

impl MemoryBrokerConfig {
    /// Set the ack wait
    pub fn ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }
}

struct SubjectLog {
    messages: Vec<Bytes>,
    durables: HashMap<String, DurableState>,
    /// Latest sequence, watched by subscribers waiting for new messages
    head: watch::Sender<u64>,
}

impl SubjectLog {
    fn new() -> Self {
        let (head, _) = watch::channel(0);
        Self {
            messages: Vec::new(),
            durables: HashMap::new(),
            head,
        }
    }

    fn payload(&self, sequence: u64) -> Bytes {
        self.messages[(sequence - 1) as usize].clone()
    }
}

struct DurableState {
    /// Next never-delivered sequence
    next_sequence: u64,
    /// Delivered but unacknowledged sequences. `None` means due immediately.
    pending: BTreeMap<u64, Option<Instant>>,
}

impl DurableState {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            pending: BTreeMap::new(),
        }
    }
}

struct Shared {
    subjects: Mutex<HashMap<String, SubjectLog>>,
    closed: watch::Sender<bool>,
    config: MemoryBrokerConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SubjectLog>> {
        self.subjects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Durable broker living in the current process
///
/// Cheap to clone; clones share the same logs.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Create a broker with default configuration
    pub fn new() -> Self {
        Self::with_config(MemoryBrokerConfig::default())
    }

    /// Create a broker with custom configuration
    pub fn with_config(config: MemoryBrokerConfig) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                subjects: Mutex::new(HashMap::new()),
                closed,
                config,
            }),
        }
    }

    /// Get the broker configuration
    pub fn config(&self) -> &MemoryBrokerConfig {
        &self.shared.config
    }

    /// Close the broker. Open subscriptions stop yielding messages.
    pub fn close(&self) {
        self.shared.closed.send_replace(true);
        tracing::info!("Broker closed");
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of messages ever published on `subject`
    pub fn published_count(&self, subject: &str) -> u64 {
        self.shared
            .lock()
            .get(subject)
            .map(|log| log.messages.len() as u64)
            .unwrap_or(0)
    }

    /// Number of delivered-but-unacknowledged messages for a durable subscription
    pub fn pending_count(&self, subject: &str, durable_name: &str) -> usize {
        self.shared
            .lock()
            .get(subject)
            .and_then(|log| log.durables.get(durable_name))
            .map(|state| state.pending.len())
            .unwrap_or(0)
    }

    fn append(&self, subject: &str, payload: Bytes) -> Result<u64, BrokerError> {
        if self.shared.is_closed() {
            return Err(BrokerError::Closed);
        }
        validate_subject(subject)?;

        let mut subjects = self.shared.lock();
        let log = subjects
            .entry(subject.to_string())
            .or_insert_with(SubjectLog::new);

        log.messages.push(payload);
        let sequence = log.messages.len() as u64;
        log.head.send_replace(sequence);

        tracing::trace!(subject = subject, sequence = sequence, "Message published");
        Ok(sequence)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for MemoryBroker {
    type Subscription = MemorySubscription;

    async fn subscribe_durable(
        &self,
        subject: &str,
        durable_name: &str,
    ) -> Result<MemorySubscription, BrokerError> {
        if self.shared.is_closed() {
            return Err(BrokerError::Closed);
        }
        validate_subject(subject)?;
        if durable_name.trim().is_empty() {
            return Err(BrokerError::InvalidDurableName);
        }

        let mut subjects = self.shared.lock();
        let log = subjects
            .entry(subject.to_string())
            .or_insert_with(SubjectLog::new);

        let (resumed, pending) = match log.durables.get_mut(durable_name) {
            Some(state) => {
                // Everything left unacked by the previous holder is due now
                for delivered_at in state.pending.values_mut() {
                    *delivered_at = None;
                }
                (true, state.pending.len())
            }
            None => {
                log.durables
                    .insert(durable_name.to_string(), DurableState::new());
                (false, 0)
            }
        };

        let head = log.head.subscribe();

        tracing::info!(
            subject = subject,
            durable = durable_name,
            resumed = resumed,
            pending = pending,
            "Durable subscription opened"
        );

        Ok(MemorySubscription {
            shared: Arc::clone(&self.shared),
            subject: subject.to_string(),
            durable_name: durable_name.to_string(),
            head,
            closed: self.shared.closed.subscribe(),
        })
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<u64, BrokerError> {
        self.append(subject, payload)
    }
}

/// Durable subscription on a [`MemoryBroker`]
pub struct MemorySubscription {
    shared: Arc<Shared>,
    subject: String,
    durable_name: String,
    head: watch::Receiver<u64>,
    closed: watch::Receiver<bool>,
}

impl MemorySubscription {
    /// Subject this subscription reads
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Durable name this subscription resumes under
    pub fn durable_name(&self) -> &str {
        &self.durable_name
    }

    /// Take the next deliverable message, or report how long until a pending
    /// one becomes due for redelivery.
    fn take_ready(&self) -> Result<Delivery, Option<Duration>> {
        let ack_wait = self.shared.config.ack_wait;
        let now = Instant::now();

        let mut subjects = self.shared.lock();
        let log = subjects.get_mut(&self.subject).ok_or(None)?;
        let state = log
            .durables
            .entry(self.durable_name.clone())
            .or_insert_with(DurableState::new);

        let due = state
            .pending
            .iter()
            .find(|(_, delivered_at)| {
                delivered_at.map_or(true, |at| now.duration_since(at) >= ack_wait)
            })
            .map(|(sequence, _)| *sequence);

        if let Some(sequence) = due {
            state.pending.insert(sequence, Some(now));
            return Ok(Delivery {
                sequence,
                subject: self.subject.clone(),
                payload: log.payload(sequence),
                redelivered: true,
            });
        }

        if state.next_sequence <= log.messages.len() as u64 {
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.pending.insert(sequence, Some(now));
            return Ok(Delivery {
                sequence,
                subject: self.subject.clone(),
                payload: log.payload(sequence),
                redelivered: false,
            });
        }

        Err(state
            .pending
            .values()
            .flatten()
            .map(|at| (*at + ack_wait).saturating_duration_since(now))
            .min())
    }
}

impl DurableSubscription for MemorySubscription {
    type Ack = MemoryAcknowledger;

    fn acknowledger(&self) -> MemoryAcknowledger {
        MemoryAcknowledger {
            shared: Arc::clone(&self.shared),
            subject: self.subject.clone(),
            durable_name: self.durable_name.clone(),
        }
    }

    async fn next_message(&mut self) -> Option<Delivery> {
        loop {
            if self.shared.is_closed() {
                return None;
            }

            let redelivery_in = match self.take_ready() {
                Ok(delivery) => {
                    if delivery.redelivered {
                        tracing::debug!(
                            subject = %self.subject,
                            durable = %self.durable_name,
                            sequence = delivery.sequence,
                            "Redelivering unacknowledged message"
                        );
                    }
                    return Some(delivery);
                }
                Err(wait) => wait,
            };

            let redelivery = async {
                match redelivery_in {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                changed = self.head.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = self.closed.changed() => {}
                _ = redelivery => {}
            }
        }
    }
}

/// Acknowledges deliveries of a [`MemorySubscription`]
#[derive(Clone)]
pub struct MemoryAcknowledger {
    shared: Arc<Shared>,
    subject: String,
    durable_name: String,
}

impl Acknowledger for MemoryAcknowledger {
    async fn ack(&self, sequence: u64) -> Result<(), BrokerError> {
        let mut subjects = self.shared.lock();
        let state = subjects
            .get_mut(&self.subject)
            .and_then(|log| log.durables.get_mut(&self.durable_name))
            .ok_or(BrokerError::UnknownSequence(sequence))?;

        if state.pending.remove(&sequence).is_some() {
            return Ok(());
        }

        if sequence >= 1 && sequence < state.next_sequence {
            // Already acknowledged
            Ok(())
        } else {
            Err(BrokerError::UnknownSequence(sequence))
        }
    }
}
