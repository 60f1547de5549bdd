//! Error types for BtChat
//!
//! Specific error enums for the transport and session layers, unified by
//! [`BtchatError`].

use crate::types::{Role, SessionState};

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures reported by the transport or while establishing a connection
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A permission or capability is missing; recoverable
    #[error("Capability unavailable: {capability}")]
    CapabilityUnavailable { capability: String },
    #[error("Discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
    #[error("Connection failed to peer {peer}: {reason}")]
    ConnectionFailed { peer: String, reason: String },
    #[error("Connection to peer {peer} timed out after {duration_ms}ms")]
    Timeout { peer: String, duration_ms: u64 },
    #[error("Endpoint already in use: {address}")]
    AddressInUse { address: String },
    #[error("Passive endpoint closed before a connection arrived")]
    EndpointClosed,
    #[error("Connection attempt cancelled")]
    Cancelled,
    #[error("Stream I/O error: {0}")]
    StreamIo(#[from] std::io::Error),
}

/// Misuse of a session or the session manager
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A {role} session is already active")]
    AlreadyActive { role: Role },
    #[error("No active chat session")]
    NoActiveSession,
    #[error("Chat session is not running")]
    NotRunning,
    #[error("Chat session already started")]
    AlreadyStarted,
    #[error("Session state invalid: expected {expected}, got {actual}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
    #[error("Write timed out after {duration_ms}ms")]
    WriteTimeout { duration_ms: u64 },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BtchatError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Channel communication error
    #[error("Channel error: {message}")]
    Channel { message: String },
}

pub type BtchatResult<T> = core::result::Result<T, BtchatError>;

impl From<std::io::Error> for BtchatError {
    fn from(err: std::io::Error) -> Self {
        BtchatError::Transport(TransportError::StreamIo(err))
    }
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl BtchatError {
    /// Create a capability error naming the missing permission
    pub fn capability_unavailable<T: Into<String>>(capability: T) -> Self {
        BtchatError::Transport(TransportError::CapabilityUnavailable {
            capability: capability.into(),
        })
    }

    /// Create a transport connection failed error
    pub fn connection_failed<P: Into<String>, R: Into<String>>(peer: P, reason: R) -> Self {
        BtchatError::Transport(TransportError::ConnectionFailed {
            peer: peer.into(),
            reason: reason.into(),
        })
    }

    /// Create a discovery failure with a reason
    pub fn discovery_failed<T: Into<String>>(reason: T) -> Self {
        BtchatError::Transport(TransportError::DiscoveryFailed {
            reason: reason.into(),
        })
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        BtchatError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        BtchatError::Channel {
            message: message.into(),
        }
    }

    /// Expected, retryable condition rather than a fault
    pub fn is_capability_unavailable(&self) -> bool {
        matches!(
            self,
            BtchatError::Transport(TransportError::CapabilityUnavailable { .. })
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BtchatError::Transport(TransportError::Cancelled))
    }
}
