//! BtChat Core
//!
//! Transport-agnostic building blocks for a two-peer chat over a short-range
//! wireless link:
//!
//! - [`device`] - observed peers and the signal quality score
//! - [`registry`] - de-duplicated device bookkeeping with change notification
//! - [`types`] - roles, session states and chat messages
//! - [`events`] - inbound transport events and the outbound event bus
//! - [`transport`] - capabilities the radio stack must provide
//! - [`config`] - configuration structures
//! - [`errors`] - error taxonomy
//!
//! The execution contexts (discovery timer, connection establishment, chat read
//! loop) live in `btchat-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod device;
pub mod errors;
pub mod events;
pub mod registry;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    BtchatConfig, ChannelConfig, DiscoveryConfig, ServiceConfig, SessionConfig, SERVICE_NAME,
    SERVICE_UUID,
};
pub use device::{quality, Device, RSSI_UNKNOWN, UNKNOWN_DEVICE_NAME};
pub use errors::{BtchatError, BtchatResult, SessionError, TransportError};
pub use events::{ChatEvent, ConnectionRequest, DiscoveryEvent, ErrorContext, EventBus};
pub use registry::DeviceRegistry;
pub use transport::{
    Accepted, BoxedStream, ByteStream, DiscoveryTransport, PassiveEndpoint, StreamTransport,
};
pub use types::{ChatMessage, Direction, Role, SessionState};
