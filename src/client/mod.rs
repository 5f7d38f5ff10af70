//! Delivery client implementation
//!
//! Provides the client side of the delivery protocol for:
//! - Pulling a page of history (`list`)
//! - Flipping a notification's read flag (`mark_opened`)
//! - Following the live stream of new notifications (`subscribe`)

pub mod connector;

pub use connector::{DeliveryClient, NotificationStream};
