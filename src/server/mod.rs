//! TCP delivery server
//!
//! Exposes [`DeliveryService`](crate::service::DeliveryService) over the framed
//! JSON protocol in [`crate::protocol`]. Every request carries a bearer token;
//! the verified identity decides whose notifications a connection can see.

pub mod config;
mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::DeliveryServer;
