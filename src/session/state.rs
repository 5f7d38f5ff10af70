//! Session state machine
//!
//! Tracks a delivery session from identity verification to close.

use std::time::{Duration, Instant};

use crate::notification::UserId;
use crate::registry::SessionId;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Identity verified, not yet registered
    Connecting,
    /// Registered and receiving broadcasts
    Open,
    /// Removed from the registry
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client went away
    ClientDisconnected,
    /// Owner dropped or cancelled the session
    Cancelled,
    /// Writing a notification to the client failed or timed out
    PushFailed,
    /// Registry dropped the session because its buffer was full
    Evicted,
    /// Server or registry is shutting down
    ServerShutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientDisconnected => "client_disconnected",
            CloseReason::Cancelled => "cancelled",
            CloseReason::PushFailed => "push_failed",
            CloseReason::Evicted => "evicted",
            CloseReason::ServerShutdown => "server_shutdown",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Recipient this session delivers to
    pub recipient: UserId,

    /// Registry session ID (after registration)
    pub session_id: Option<SessionId>,

    /// Current phase
    pub phase: SessionPhase,

    /// Creation time
    pub created_at: Instant,

    /// Time the session was registered
    pub opened_at: Option<Instant>,

    /// Reason recorded at close
    pub close_reason: Option<CloseReason>,

    /// Notifications handed to the owner
    pub delivered: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new(recipient: UserId) -> Self {
        Self {
            recipient,
            session_id: None,
            phase: SessionPhase::Connecting,
            created_at: Instant::now(),
            opened_at: None,
            close_reason: None,
            delivered: 0,
        }
    }

    /// Registration succeeded
    pub fn on_open(&mut self, session_id: SessionId) {
        if self.phase == SessionPhase::Connecting {
            self.session_id = Some(session_id);
            self.phase = SessionPhase::Open;
            self.opened_at = Some(Instant::now());
        }
    }

    /// Move to `Closed`. Returns false if already closed; the first reason wins.
    pub fn on_close(&mut self, reason: CloseReason) -> bool {
        if self.phase == SessionPhase::Closed {
            return false;
        }
        self.phase = SessionPhase::Closed;
        self.close_reason = Some(reason);
        true
    }

    pub fn record_delivered(&mut self) {
        self.delivered += 1;
    }

    /// Check if session is open
    pub fn is_open(&self) -> bool {
        self.phase == SessionPhase::Open
    }

    /// Time since registration, zero if never opened
    pub fn open_duration(&self) -> Duration {
        self.opened_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let mut state = SessionState::new(7);
        assert_eq!(state.phase, SessionPhase::Connecting);
        assert!(!state.is_open());

        state.on_open(3);
        assert_eq!(state.phase, SessionPhase::Open);
        assert_eq!(state.session_id, Some(3));
        assert!(state.opened_at.is_some());

        assert!(state.on_close(CloseReason::ClientDisconnected));
        assert_eq!(state.phase, SessionPhase::Closed);
        assert_eq!(state.close_reason, Some(CloseReason::ClientDisconnected));
    }

    #[test]
    fn test_first_close_reason_wins() {
        let mut state = SessionState::new(7);
        state.on_open(1);

        assert!(state.on_close(CloseReason::Evicted));
        assert!(!state.on_close(CloseReason::Cancelled));
        assert_eq!(state.close_reason, Some(CloseReason::Evicted));
    }

    #[test]
    fn test_closed_session_does_not_reopen() {
        let mut state = SessionState::new(7);
        state.on_close(CloseReason::ServerShutdown);
        state.on_open(1);

        assert_eq!(state.phase, SessionPhase::Closed);
        assert_eq!(state.session_id, None);
        assert_eq!(state.open_duration(), Duration::ZERO);
    }
}
