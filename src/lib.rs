//! Notification fan-out and live delivery pipeline
//!
//! When a content-created event reaches the broker, the pipeline resolves the
//! originator's followers, writes one notification row per follower in a single
//! atomic batch, and pushes each row to any live session its recipient holds open.
//!
//! # Data flow
//!
//! ```text
//!   Broker (durable subject)
//!        │ Delivery { sequence, payload }
//!        ▼
//!   EventIngress ── decode ──► bounded queue (128) ──► worker
//!                                                        │
//!                          AudienceResolver ◄────────────┤ list_followers()
//!                          NotificationMaterializer ◄────┤ bulk_create()
//!                          DeliveryRegistry ◄────────────┘ broadcast()
//!                                │
//!                 ┌──────────────┼──────────────┐
//!                 ▼              ▼              ▼
//!           [Subscription]  [Subscription]  [Subscription]
//!                 │
//!                 └──► DeliveryServer ──► TCP client
//! ```
//!
//! The broker message is acknowledged only after the worker finishes with it, so a
//! crash or a failed store write leads to redelivery. Live push is best-effort:
//! recipients without an open session read their rows back with `list`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fanout_rs::broker::MemoryBroker;
//! use fanout_rs::ingress::{EventIngress, IngressConfig};
//! use fanout_rs::store::MemoryNotificationStore;
//! use fanout_rs::{DeliveryRegistry, MemoryFollowerGraph, NotificationPipeline};
//!
//! # async fn example() -> fanout_rs::error::Result<()> {
//! let broker = MemoryBroker::new();
//! let graph = Arc::new(MemoryFollowerGraph::new());
//! let store = Arc::new(MemoryNotificationStore::new());
//! let registry = Arc::new(DeliveryRegistry::new());
//!
//! let pipeline = Arc::new(NotificationPipeline::new(graph, store, registry));
//! let ingress = EventIngress::start(&broker, IngressConfig::default(), pipeline).await?;
//!
//! // ...
//!
//! ingress.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod audience;
pub mod auth;
pub mod broker;
pub mod client;
pub mod error;
pub mod event;
pub mod ingress;
pub mod materializer;
pub mod notification;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod service;
pub mod session;
mod shutdown;
pub mod stats;
pub mod store;

pub use audience::{AudienceResolver, FollowerGraph, MemoryFollowerGraph};
pub use auth::{Identity, StaticTokenVerifier, TokenVerifier};
pub use event::ContentEvent;
pub use notification::{NewNotification, Notification, NotificationId, NotificationType, UserId};
pub use pipeline::{NotificationPipeline, ProcessOutcome};
pub use registry::DeliveryRegistry;
pub use server::{DeliveryServer, ServerConfig};
pub use service::{DeliveryService, ListRequest, Page};
pub use session::Subscription;
