//! Reader and worker tasks
//!
//! ```text
//!  DurableSubscription ──► reader ──► mpsc(queue_capacity) ──► worker ──► EventProcessor
//!         ▲                  │ malformed                         │ Ok
//!         └──── ack ─────────┘                                   └──► ack
//! ```
//!
//! The reader decodes payloads and blocks on the queue when it is full. The
//! worker handles one event at a time and acks it only after the processor
//! succeeds; a failed event stays pending at the broker and comes back on
//! redelivery.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::broker::{Acknowledger, Broker, DurableSubscription};
use crate::error::Result;
use crate::event::ContentEvent;
use crate::shutdown::shutdown_signalled;
use crate::stats::{IngressSnapshot, IngressStats};

use super::config::IngressConfig;

/// Handles one decoded event
pub trait EventProcessor: Send + Sync + 'static {
    /// Process `event`. An error leaves the broker message unacknowledged.
    fn process(&self, event: ContentEvent) -> impl Future<Output = Result<()>> + Send;
}

/// A decoded event waiting for the worker
#[derive(Debug)]
struct QueuedEvent {
    sequence: u64,
    redelivered: bool,
    event: ContentEvent,
}

/// Starts the ingress tasks
pub struct EventIngress;

impl EventIngress {
    /// Open the durable subscription and spawn the reader and worker
    ///
    /// Failing to subscribe is returned to the caller; nothing is spawned then.
    pub async fn start<B, P>(
        broker: &B,
        config: IngressConfig,
        processor: Arc<P>,
    ) -> Result<IngressHandle>
    where
        B: Broker,
        P: EventProcessor,
    {
        let subscription = broker
            .subscribe_durable(&config.subject, &config.durable_name)
            .await
            .map_err(|e| {
                tracing::error!(
                    subject = %config.subject,
                    durable = %config.durable_name,
                    error = %e,
                    "Failed to open durable subscription"
                );
                e
            })?;

        let acknowledger = subscription.acknowledger();
        let stats = Arc::new(IngressStats::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);

        tracing::info!(
            subject = %config.subject,
            durable = %config.durable_name,
            queue_capacity = config.queue_capacity,
            "Event ingress started"
        );

        let reader = tokio::spawn(read_loop(
            subscription,
            acknowledger.clone(),
            queue_tx,
            shutdown_rx.clone(),
            Arc::clone(&stats),
        ));
        let worker = tokio::spawn(work_loop(
            queue_rx,
            acknowledger,
            processor,
            shutdown_rx,
            Arc::clone(&stats),
        ));

        Ok(IngressHandle {
            stats,
            shutdown,
            reader,
            worker,
        })
    }
}

/// Running ingress
pub struct IngressHandle {
    stats: Arc<IngressStats>,
    shutdown: watch::Sender<bool>,
    reader: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl IngressHandle {
    /// Current counters
    pub fn stats(&self) -> IngressSnapshot {
        self.stats.snapshot()
    }

    /// Whether both tasks have exited (e.g. the broker was closed)
    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.worker.is_finished()
    }

    /// Stop reading, let the worker finish its current event, and join both tasks
    ///
    /// Events still queued are not processed; they were never acked, so the
    /// broker redelivers them to the next subscriber.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.send_replace(true);
        self.join().await
    }

    /// Wait for both tasks to exit on their own
    pub async fn join(self) -> Result<()> {
        self.reader.await?;
        self.worker.await?;

        let stats = self.stats.snapshot();
        tracing::info!(
            received = stats.received,
            processed = stats.processed,
            failed = stats.failed,
            malformed = stats.malformed,
            "Event ingress stopped"
        );
        Ok(())
    }
}

async fn read_loop<S: DurableSubscription>(
    mut subscription: S,
    acknowledger: S::Ack,
    queue: mpsc::Sender<QueuedEvent>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<IngressStats>,
) {
    loop {
        let delivery = tokio::select! {
            _ = shutdown_signalled(&mut shutdown) => break,
            delivery = subscription.next_message() => match delivery {
                Some(delivery) => delivery,
                None => {
                    tracing::info!("Broker subscription ended");
                    break;
                }
            },
        };

        stats.record_received(delivery.redelivered);

        let event = match ContentEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    sequence = delivery.sequence,
                    subject = %delivery.subject,
                    payload_len = delivery.payload.len(),
                    error = %e,
                    "Skipping malformed event"
                );
                stats.record_malformed();
                ack(&acknowledger, delivery.sequence, &stats).await;
                continue;
            }
        };

        let queued = QueuedEvent {
            sequence: delivery.sequence,
            redelivered: delivery.redelivered,
            event,
        };

        // Blocks while the worker is behind.
        tokio::select! {
            _ = shutdown_signalled(&mut shutdown) => break,
            sent = queue.send(queued) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn work_loop<A: Acknowledger, P: EventProcessor>(
    mut queue: mpsc::Receiver<QueuedEvent>,
    acknowledger: A,
    processor: Arc<P>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<IngressStats>,
) {
    loop {
        let queued = tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown) => break,
            queued = queue.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };

        let sequence = queued.sequence;
        let origin = queued.event.origin_user_id;
        let content_id = queued.event.content_id;

        match processor.process(queued.event).await {
            Ok(()) => {
                stats.record_processed();
                ack(&acknowledger, sequence, &stats).await;
            }
            Err(e) => {
                stats.record_failed();
                tracing::error!(
                    sequence = sequence,
                    origin = origin,
                    content_id = content_id,
                    redelivered = queued.redelivered,
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "Event processing failed, leaving it for redelivery"
                );
            }
        }
    }
}

async fn ack<A: Acknowledger>(acknowledger: &A, sequence: u64, stats: &IngressStats) {
    match acknowledger.ack(sequence).await {
        Ok(()) => stats.record_acked(),
        Err(e) => {
            tracing::warn!(sequence = sequence, error = %e, "Failed to acknowledge event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;

    use crate::audience::GraphError;
    use crate::broker::MemoryBroker;
    use crate::error::Error;

    /// Records events; fails the first `fail_first` calls
    struct Recorder {
        seen: Mutex<Vec<ContentEvent>>,
        fail_first: Mutex<usize>,
    }

    impl Recorder {
        fn new(fail_first: usize) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_first: Mutex::new(fail_first),
            }
        }

        fn seen(&self) -> Vec<i64> {
            self.seen.lock().unwrap().iter().map(|e| e.content_id).collect()
        }
    }

    impl EventProcessor for Recorder {
        async fn process(&self, event: ContentEvent) -> Result<()> {
            {
                let mut remaining = self.fail_first.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Audience(GraphError::Unavailable("down".into())));
                }
            }
            self.seen.lock().unwrap().push(event);
            Ok(())
        }
    }

    async fn publish(broker: &MemoryBroker, event: &ContentEvent) {
        broker
            .publish("tweets", event.encode().unwrap())
            .await
            .unwrap();
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_processes_in_order_and_acks() {
        let broker = MemoryBroker::new();
        let recorder = Arc::new(Recorder::new(0));
        let ingress = EventIngress::start(&broker, IngressConfig::default(), Arc::clone(&recorder))
            .await
            .unwrap();

        for id in 1..=3 {
            publish(&broker, &ContentEvent::new(1, id, "t")).await;
        }

        wait_until(|| ingress.stats().acked == 3).await;
        assert_eq!(recorder.seen(), vec![1, 2, 3]);
        assert_eq!(broker.pending_count("tweets", "notification-service"), 0);

        ingress.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_payload_acked_and_skipped() {
        let broker = MemoryBroker::new();
        let recorder = Arc::new(Recorder::new(0));
        let ingress = EventIngress::start(&broker, IngressConfig::default(), Arc::clone(&recorder))
            .await
            .unwrap();

        publish(&broker, &ContentEvent::new(1, 1, "t")).await;
        broker
            .publish("tweets", Bytes::from_static(b"{not json"))
            .await
            .unwrap();
        publish(&broker, &ContentEvent::new(1, 2, "t")).await;

        wait_until(|| ingress.stats().acked == 3).await;
        let stats = ingress.stats();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.processed, 2);
        assert_eq!(recorder.seen(), vec![1, 2]);

        ingress.shutdown().await.unwrap();
    }

    /// Holds every event until the test releases a permit for it
    struct Gated {
        gate: tokio::sync::Semaphore,
        seen: Mutex<Vec<i64>>,
    }

    impl EventProcessor for Gated {
        async fn process(&self, event: ContentEvent) -> Result<()> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.seen.lock().unwrap().push(event.content_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_queue_blocks_reader() {
        let broker = MemoryBroker::new();
        let processor = Arc::new(Gated {
            gate: tokio::sync::Semaphore::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let ingress = EventIngress::start(
            &broker,
            IngressConfig::default().queue_capacity(1),
            Arc::clone(&processor),
        )
        .await
        .unwrap();

        for id in 1..=10 {
            publish(&broker, &ContentEvent::new(1, id, "t")).await;
        }

        // One event in the worker, one queued, one held by the blocked reader.
        wait_until(|| ingress.stats().received == 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = ingress.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.acked, 0);
        assert_eq!(broker.pending_count("tweets", "notification-service"), 3);
        assert_eq!(broker.published_count("tweets"), 10);

        processor.gate.add_permits(10);

        wait_until(|| ingress.stats().acked == 10).await;
        let stats = ingress.stats();
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.malformed, 0);
        assert_eq!(*processor.seen.lock().unwrap(), (1..=10).collect::<Vec<_>>());
        assert_eq!(broker.pending_count("tweets", "notification-service"), 0);

        ingress.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_event_redelivered() {
        let broker = MemoryBroker::with_config(
            crate::broker::MemoryBrokerConfig::default().ack_wait(Duration::from_millis(50)),
        );
        let recorder = Arc::new(Recorder::new(1));
        let ingress = EventIngress::start(&broker, IngressConfig::default(), Arc::clone(&recorder))
            .await
            .unwrap();

        publish(&broker, &ContentEvent::new(1, 7, "t")).await;

        wait_until(|| ingress.stats().processed == 1).await;
        let stats = ingress.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.redelivered, 1);
        assert_eq!(recorder.seen(), vec![7]);

        ingress.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_broker_close_stops_tasks() {
        let broker = MemoryBroker::new();
        let ingress = EventIngress::start(&broker, IngressConfig::default(), Arc::new(Recorder::new(0)))
            .await
            .unwrap();

        broker.close();
        ingress.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_failure_returned() {
        let broker = MemoryBroker::new();
        let result = EventIngress::start(
            &broker,
            IngressConfig::default().subject(""),
            Arc::new(Recorder::new(0)),
        )
        .await;

        assert!(matches!(result, Err(Error::Broker(_))));
    }
}
