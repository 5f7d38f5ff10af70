//! Delivery registry for live notification fan-out
//!
//! The registry tracks which recipients currently have live sessions and pushes
//! freshly persisted notifications to them. Each session owns a bounded
//! `tokio::sync::mpsc` channel; the registry keeps only the sending halves.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<DeliveryRegistry>
//!                   ┌─────────────────────────────┐
//!                   │ recipients: HashMap<UserId, │
//!                   │   RecipientEntry {          │
//!                   │     sessions: {id -> tx}    │
//!                   │   }                         │
//!                   │ >                           │
//!                   └──────────────┬──────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!   [Pipeline]               [Subscription]            [Subscription]
//!   broadcast()              rx.recv()                 rx.recv()
//!        │                         │                         │
//!        └──► try_send ────────────┴──► connection ──► TCP ──┘
//! ```
//!
//! # Backpressure
//!
//! Broadcasting never waits. A session whose buffer is full is evicted: its
//! sender is dropped, the session drains what it already holds and then sees the
//! end of its channel. Missed notifications remain available through `List`.
//!
//! Notifications are shared as `Arc<Notification>`, so every session of a
//! recipient references the same allocation.

pub mod config;
pub mod entry;
pub mod error;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{RecipientEntry, SessionId};
pub use error::RegistryError;
pub use store::{DeliveryRegistry, SessionReceiver};
