//! Session roles, states and chat messages

use core::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Role
// ----------------------------------------------------------------------------

/// Connection-establishment role of the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Passive acceptor of exactly one inbound connection
    Listener,
    /// Active connector towards a known peer identity
    Initiator,
}

impl Role {
    /// State a session of this role is in while the connection is pending
    pub fn pending_state(self) -> SessionState {
        match self {
            Role::Listener => SessionState::Listening,
            Role::Initiator => SessionState::Connecting,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Listener => write!(f, "listener"),
            Role::Initiator => write!(f, "initiator"),
        }
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle of a session.
///
/// A session leaves its pending state (`Listening` / `Connecting`) exactly once,
/// into `Connected` or `Failed`, and enters `Closed` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Listening,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_pending(self) -> bool {
        matches!(self, SessionState::Listening | SessionState::Connecting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

// ----------------------------------------------------------------------------
// Chat Messages
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

/// One chat message as delivered to the display collaborator.
///
/// There is no framing: a received message is whatever a single read returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub direction: Direction,
    pub text: String,
}

impl ChatMessage {
    pub fn sent(text: impl Into<String>) -> Self {
        Self {
            direction: Direction::Sent,
            text: text.into(),
        }
    }

    pub fn received(text: impl Into<String>) -> Self {
        Self {
            direction: Direction::Received,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_state_per_role() {
        assert_eq!(Role::Listener.pending_state(), SessionState::Listening);
        assert_eq!(Role::Initiator.pending_state(), SessionState::Connecting);
        assert!(Role::Listener.pending_state().is_pending());
        assert!(!SessionState::Connected.is_pending());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }
}
