//! Event types exchanged with the transport and display collaborators
//!
//! Inbound: [`DiscoveryEvent`] from the radio stack and [`ConnectionRequest`]
//! from the UI. Outbound: [`ChatEvent`] published on an [`EventBus`] that any
//! number of display collaborators subscribe to.

use core::fmt;

use tokio::sync::broadcast;
use tracing::trace;

use crate::device::Device;
use crate::types::{ChatMessage, Role, SessionState};

// ----------------------------------------------------------------------------
// Inbound Events
// ----------------------------------------------------------------------------

/// Events sent by the discovery transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A device was seen during a discovery pass
    Observed {
        address: String,
        name: Option<String>,
        rssi: i16,
    },
    /// A known device reported a new name
    Renamed { address: String, name: String },
    /// The discovery permission was granted or revoked
    CapabilityChanged { granted: bool },
}

/// Request from the UI to take one of the two connection roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRequest {
    Listen,
    Connect { address: String },
}

impl ConnectionRequest {
    pub fn role(&self) -> Role {
        match self {
            ConnectionRequest::Listen => Role::Listener,
            ConnectionRequest::Connect { .. } => Role::Initiator,
        }
    }
}

// ----------------------------------------------------------------------------
// Outbound Events
// ----------------------------------------------------------------------------

/// Where an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    Discovery,
    Connection,
    Session,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorContext::Discovery => write!(f, "discovery"),
            ErrorContext::Connection => write!(f, "connection"),
            ErrorContext::Session => write!(f, "session"),
        }
    }
}

/// Events published for display collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The device registry changed; `devices` is ordered by address
    DeviceListChanged { version: u64, devices: Vec<Device> },
    SessionStateChanged {
        role: Role,
        state: SessionState,
        peer: Option<String>,
    },
    Message { peer: String, message: ChatMessage },
    Error {
        context: ErrorContext,
        message: String,
    },
}

// ----------------------------------------------------------------------------
// Event Bus
// ----------------------------------------------------------------------------

/// Typed publish/subscribe feed of [`ChatEvent`]s.
///
/// Cloning shares the same feed. Publishing never blocks and succeeds with no
/// subscribers; a subscriber that falls more than the buffer size behind
/// observes `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to all current subscribers, returning how many received it
    pub fn publish(&self, event: ChatEvent) -> usize {
        match self.sender.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                trace!("No subscribers for event {:?}", event);
                0
            }
        }
    }

    pub fn publish_state(&self, role: Role, state: SessionState, peer: Option<String>) -> usize {
        self.publish(ChatEvent::SessionStateChanged { role, state, peer })
    }

    pub fn publish_error(&self, context: ErrorContext, error: impl fmt::Display) -> usize {
        self.publish(ChatEvent::Error {
            context,
            message: error.to_string(),
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::ChannelConfig::default().event_buffer_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish_error(ErrorContext::Discovery, "scan failed"), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_publish_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish_state(Role::Listener, SessionState::Listening, None);
        bus.publish(ChatEvent::Message {
            peer: "AA:BB".to_string(),
            message: ChatMessage::received("hi"),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            ChatEvent::SessionStateChanged {
                role: Role::Listener,
                state: SessionState::Listening,
                peer: None,
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), ChatEvent::Message { .. }));
    }

    #[test]
    fn test_request_roles() {
        assert_eq!(ConnectionRequest::Listen.role(), Role::Listener);
        let request = ConnectionRequest::Connect {
            address: "AA:BB".to_string(),
        };
        assert_eq!(request.role(), Role::Initiator);
    }
}
