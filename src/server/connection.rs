//! Per-connection request handling
//!
//! A connection serves unary requests (`list`, `mark_opened`) until the client
//! sends `subscribe`, after which it becomes a push stream for the caller until
//! the client disconnects, a send fails or the server shuts down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::auth::{Identity, TokenVerifier};
use crate::error::{Error, Result};
use crate::protocol::{FrameReader, FrameWriter, ProtocolError, Request, Response, StatusCode};
use crate::server::config::ServerConfig;
use crate::service::{DeliveryService, ListRequest};
use crate::session::{CloseReason, Subscription};
use crate::shutdown::shutdown_signalled;
use crate::store::NotificationStore;

/// Handles a single client connection
pub(crate) struct Connection<V, S> {
    id: u64,
    peer_addr: SocketAddr,
    config: ServerConfig,
    verifier: Arc<V>,
    service: DeliveryService<S>,
    shutdown: watch::Receiver<bool>,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl<V: TokenVerifier, S: NotificationStore> Connection<V, S> {
    pub fn new(
        id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        verifier: Arc<V>,
        service: DeliveryService<S>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (read_half, write_half) = socket.into_split();
        Self {
            id,
            peer_addr,
            reader: FrameReader::with_max_frame_size(read_half, config.max_frame_size),
            writer: FrameWriter::with_max_frame_size(write_half, config.max_frame_size),
            config,
            verifier,
            service,
            shutdown,
        }
    }

    /// Serve requests until the client leaves or the server shuts down
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let read = tokio::select! {
                _ = shutdown_signalled(&mut self.shutdown) => {
                    tracing::debug!(connection_id = self.id, "Closing idle connection for shutdown");
                    return Ok(());
                }
                read = self.reader.read::<Request>() => read,
            };

            let request = match read {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.reject(&e.to_string(), StatusCode::InvalidArgument).await;
                    return Err(e.into());
                }
            };

            let identity = match self.verifier.verify(request.token()) {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(
                        connection_id = self.id,
                        peer = %self.peer_addr,
                        op = request.op(),
                        error = %e,
                        "Request rejected: authentication failed"
                    );
                    self.reject(&e.to_string(), StatusCode::Unauthenticated).await;
                    return Ok(());
                }
            };

            tracing::debug!(
                connection_id = self.id,
                user_id = identity.user_id,
                op = request.op(),
                "Request received"
            );

            match request {
                Request::Subscribe { .. } => return self.stream(identity).await,
                Request::List {
                    recipient,
                    before,
                    limit,
                    ..
                } => {
                    let request = ListRequest {
                        recipient,
                        before,
                        limit,
                    };
                    let response = match self.bounded(self.service.list(&identity, request)).await {
                        Ok(page) => Response::Page {
                            notifications: page.notifications,
                            next_before: page.next_before,
                        },
                        Err(e) => error_response(&e),
                    };
                    self.writer.write(&response).await?;
                }
                Request::MarkOpened { id, opened, .. } => {
                    let response =
                        match self.bounded(self.service.mark_opened(&identity, id, opened)).await {
                            Ok(()) => Response::Ack,
                            Err(e) => error_response(&e),
                        };
                    self.writer.write(&response).await?;
                }
            }
        }
    }

    /// Run a unary operation under the request timeout
    async fn bounded<T>(&self, op: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.config.request_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "request timed out",
            ))),
        }
    }

    /// Push the caller's notifications until the session ends
    async fn stream(&mut self, identity: Identity) -> Result<()> {
        let mut subscription = match self.service.subscribe(&identity) {
            Ok(subscription) => subscription,
            Err(e) => {
                let response = error_response(&e);
                self.writer.write(&response).await?;
                return Ok(());
            }
        };

        tracing::info!(
            connection_id = self.id,
            peer = %self.peer_addr,
            user_id = identity.user_id,
            session_id = ?subscription.session_id(),
            "Subscription opened"
        );

        loop {
            tokio::select! {
                _ = shutdown_signalled(&mut self.shutdown) => {
                    subscription.close(CloseReason::ServerShutdown);
                    break;
                }
                next = subscription.recv() => {
                    let Some(notification) = next else { break };
                    let frame = Response::Notification {
                        notification: notification.as_ref().clone(),
                    };
                    match timeout(self.config.send_timeout, self.writer.write(&frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            subscription.close(CloseReason::PushFailed);
                            return Err(e.into());
                        }
                        Err(_) => {
                            tracing::warn!(
                                connection_id = self.id,
                                user_id = identity.user_id,
                                notification_id = notification.id,
                                "Send timed out, closing session"
                            );
                            subscription.close(CloseReason::PushFailed);
                            return Ok(());
                        }
                    }
                }
                read = self.reader.read::<Request>() => match read {
                    Ok(Some(request)) => {
                        tracing::debug!(
                            connection_id = self.id,
                            op = request.op(),
                            "Ignoring request on a subscribed connection"
                        );
                    }
                    Ok(None) | Err(_) => {
                        subscription.close(CloseReason::ClientDisconnected);
                        return Ok(());
                    }
                },
            }
        }

        // Tell the client why the stream ended.
        let status = match subscription.close_reason() {
            Some(CloseReason::Evicted) => {
                Response::status(StatusCode::ResourceExhausted, "session fell behind")
            }
            _ => Response::status(StatusCode::Unavailable, "server shutting down"),
        };
        let _ = timeout(self.config.send_timeout, self.writer.write(&status)).await;
        Ok(())
    }

    /// Report a terminal status and stop writing
    async fn reject(&mut self, message: &str, code: StatusCode) {
        let response = Response::status(code, message);
        match timeout(self.config.send_timeout, self.writer.write(&response)).await {
            Ok(Ok(())) => {
                let _ = self.writer.shutdown().await;
            }
            Ok(Err(ProtocolError::Io(e))) => {
                tracing::debug!(connection_id = self.id, error = %e, "Failed to send status");
            }
            _ => {}
        }
    }
}

fn error_response(error: &Error) -> Response {
    let code = error.status_code();
    if code == StatusCode::Internal || code == StatusCode::Unavailable {
        tracing::error!(error = %error, "Request failed");
    }
    Response::status(code, error.to_string())
}
