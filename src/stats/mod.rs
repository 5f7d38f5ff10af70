//! Statistics for the ingress worker and delivery registry

pub mod metrics;

pub use metrics::{IngressSnapshot, IngressStats, RegistrySnapshot, RegistryStats};
