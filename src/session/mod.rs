//! Delivery sessions
//!
//! A session is one live, identity-scoped stream of notifications for a single
//! recipient. It is opened by registering with the [`DeliveryRegistry`] and
//! closed on client disconnect, cancellation, push failure or eviction.
//!
//! [`DeliveryRegistry`]: crate::registry::DeliveryRegistry

pub mod state;
pub mod subscription;

pub use state::{CloseReason, SessionPhase, SessionState};
pub use subscription::Subscription;
