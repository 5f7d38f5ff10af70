//! Delivery server listener
//!
//! Handles the TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

use crate::auth::TokenVerifier;
use crate::error::Result;
use crate::registry::DeliveryRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::service::DeliveryService;
use crate::shutdown::shutdown_signalled;
use crate::store::NotificationStore;

/// Notification delivery server
pub struct DeliveryServer<V, S> {
    config: ServerConfig,
    verifier: Arc<V>,
    service: DeliveryService<S>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    shutdown: watch::Sender<bool>,
}

impl<V: TokenVerifier, S: NotificationStore> DeliveryServer<V, S> {
    /// Create a new server
    ///
    /// The registry is shared with the pipeline that broadcasts into it.
    pub fn new(
        config: ServerConfig,
        verifier: Arc<V>,
        store: Arc<S>,
        registry: Arc<DeliveryRegistry>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let service = DeliveryService::new(store, registry)
            .page_sizes(config.default_page_size, config.max_page_size);
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            verifier,
            service,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
            shutdown,
        }
    }

    /// The service the connections call into
    pub fn service(&self) -> &DeliveryService<S> {
        &self.service
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method runs until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let mut stopped = self.shutdown.subscribe();
        self.serve(listener, async move {
            shutdown_signalled(&mut stopped).await
        })
        .await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown` resolves
    ///
    /// Open connections, including live subscriptions, are told to close.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Delivery server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener) => {}
        }

        self.shutdown();
        Ok(())
    }

    /// Ask every connection to close
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let mut connection = Connection::new(
            connection_id,
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.verifier),
            self.service.clone(),
            self.shutdown.subscribe(),
        );

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    connection_id = connection_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(connection_id = connection_id, "Connection closed");
        });
    }
}
