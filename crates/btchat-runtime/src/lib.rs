//! BtChat Runtime Engine
//!
//! The execution contexts behind a chat between two peers:
//!
//! - [`DiscoveryCycle`] - timer task restarting discovery at a fixed cadence,
//!   plus the pump feeding transport events into the device registry
//! - [`ConnectionEstablisher`] - Listener / Initiator roles producing one
//!   open stream
//! - [`ChatSession`] - read loop and writes over an established stream
//! - [`SessionManager`] - the single-session-at-a-time orchestrator
//! - [`transport`] - in-memory and TCP stream transports
//!
//! `btchat-core` provides the types and traits these tasks are built on.

pub mod chat;
pub mod discovery;
pub mod establish;
pub mod manager;
pub mod transport;

pub use chat::{ChatSession, ChatState};
pub use discovery::DiscoveryCycle;
pub use establish::{CancelHandle, ConnectionEstablisher, Establish, Established, Initiator, Listener};
pub use manager::SessionManager;
pub use transport::{MemoryDiscovery, MemoryNetwork, MemoryTransport, TcpTransport};

// Re-export core types for convenience
pub use btchat_core::{
    BtchatConfig, BtchatError, BtchatResult, ChatEvent, ChatMessage, ConnectionRequest, Device,
    DeviceRegistry, Direction, DiscoveryEvent, ErrorContext, EventBus, Role, SessionState,
};
