//! Event ingress
//!
//! Reads content events from one durable broker subscription and feeds them,
//! one at a time and in broker order, to an [`EventProcessor`]. A message is
//! acknowledged only after it has been fully processed, or immediately if its
//! payload cannot be decoded.

pub mod config;
pub mod worker;

pub use config::IngressConfig;
pub use worker::{EventIngress, EventProcessor, IngressHandle};
