//! Live notification subscription
//!
//! A [`Subscription`] is the owner side of one registry session. It yields
//! notifications for its recipient in broadcast order and deregisters itself
//! when closed or dropped.

use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;

use crate::notification::{Notification, UserId};
use crate::registry::{DeliveryRegistry, RegistryError, SessionId, SessionReceiver};

use super::state::{CloseReason, SessionPhase, SessionState};

/// One live delivery session
pub struct Subscription {
    registry: Arc<DeliveryRegistry>,
    rx: SessionReceiver,
    state: SessionState,
}

impl Subscription {
    /// Register a new session for `recipient`
    pub fn open(registry: Arc<DeliveryRegistry>, recipient: UserId) -> Result<Self, RegistryError> {
        let mut state = SessionState::new(recipient);
        let (session_id, rx) = registry.register(recipient)?;
        state.on_open(session_id);

        Ok(Self {
            registry,
            rx,
            state,
        })
    }

    pub fn recipient(&self) -> UserId {
        self.state.recipient
    }

    /// Registry session id
    pub fn session_id(&self) -> Option<SessionId> {
        self.state.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Reason the session closed, if it has
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.close_reason
    }

    /// Notifications returned to the owner so far
    pub fn delivered(&self) -> u64 {
        self.state.delivered
    }

    /// Wait for the next notification
    ///
    /// Returns `None` once the session is closed. Notifications already buffered
    /// when the registry dropped the session are still returned first.
    pub async fn recv(&mut self) -> Option<Arc<Notification>> {
        if self.state.phase == SessionPhase::Closed {
            return None;
        }

        match self.rx.recv().await {
            Some(notification) => {
                self.state.record_delivered();
                Some(notification)
            }
            None => {
                self.on_channel_closed();
                None
            }
        }
    }

    /// Take a buffered notification without waiting
    pub fn try_recv(&mut self) -> Option<Arc<Notification>> {
        if self.state.phase == SessionPhase::Closed {
            return None;
        }

        match self.rx.try_recv() {
            Ok(notification) => {
                self.state.record_delivered();
                Some(notification)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.on_channel_closed();
                None
            }
        }
    }

    /// Close the session and remove it from the registry
    pub fn close(&mut self, reason: CloseReason) {
        if !self.state.on_close(reason) {
            return;
        }

        if let Some(session_id) = self.state.session_id {
            self.registry.deregister(self.state.recipient, session_id);
        }
        self.rx.close();

        tracing::info!(
            recipient = self.state.recipient,
            session_id = ?self.state.session_id,
            reason = %reason,
            delivered = self.state.delivered,
            duration_ms = self.state.open_duration().as_millis() as u64,
            "Session closed"
        );
    }

    /// The registry dropped our sender
    fn on_channel_closed(&mut self) {
        let reason = if self.registry.is_closed() {
            CloseReason::ServerShutdown
        } else {
            CloseReason::Evicted
        };
        self.close(reason);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close(CloseReason::Cancelled);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("state", &self.state)
            .finish()
    }
}
