//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;
use crate::service::MAX_PAGE_SIZE;
use crate::store::DEFAULT_PAGE_SIZE;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Time allowed to receive and answer one unary request
    pub request_timeout: Duration,

    /// Time allowed to write one pushed notification before the session closes
    pub send_timeout: Duration,

    /// Maximum frame body size in either direction
    pub max_frame_size: usize,

    /// Page size used when a list request omits `limit`
    pub default_page_size: u32,

    /// Largest page a list request may ask for
    pub max_page_size: u32,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            request_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            tcp_nodelay: true, // Pushed notifications are small
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the unary request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the per-notification send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.min(u32::MAX as usize);
        self
    }

    /// Set default and maximum list page sizes
    pub fn page_sizes(mut self, default: u32, max: u32) -> Self {
        // One extra row is fetched past the maximum to detect a next page.
        self.max_page_size = max.clamp(1, u32::MAX - 1);
        self.default_page_size = default.clamp(1, self.max_page_size);
        self
    }
}
