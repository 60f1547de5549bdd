//! Capabilities consumed from the radio stack
//!
//! The core never performs discovery or opens sockets itself. A transport
//! provides:
//!
//! - [`DiscoveryTransport`] - start / cancel a discovery pass
//! - [`StreamTransport`] - open a passive endpoint or connect to an address,
//!   both under a rendezvous service identifier
//!
//! and delivers [`DiscoveryEvent`](crate::events::DiscoveryEvent)s through a
//! channel handed to the discovery cycle.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::errors::BtchatResult;

// ----------------------------------------------------------------------------
// Byte Streams
// ----------------------------------------------------------------------------

/// Reliable, ordered, bidirectional byte stream produced by a connection
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn ByteStream>;

/// An inbound connection accepted by a passive endpoint
pub struct Accepted {
    pub stream: BoxedStream,
    /// Identity of the remote peer
    pub peer: String,
}

impl core::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Accepted")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Control over the transport's discovery primitive
#[async_trait]
pub trait DiscoveryTransport: Send + Sync {
    /// Begin one discovery pass. Fails with `CapabilityUnavailable` when the
    /// scan permission is missing.
    async fn start_discovery(&self) -> BtchatResult<()>;

    /// Cancel the pass in progress, if any
    async fn cancel_discovery(&self) -> BtchatResult<()>;

    fn is_discovering(&self) -> bool;
}

/// Opens connections under a rendezvous service identifier
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a passive endpoint advertising `service`
    async fn listen(&self, service: Uuid) -> BtchatResult<Box<dyn PassiveEndpoint>>;

    /// Connect to the peer at `address` offering `service`
    async fn connect(&self, address: &str, service: Uuid) -> BtchatResult<BoxedStream>;
}

/// A listening endpoint. Dropping it stops listening.
#[async_trait]
pub trait PassiveEndpoint: Send {
    /// Wait for the next inbound connection
    async fn accept(&mut self) -> BtchatResult<Accepted>;

    /// Stop listening and release the endpoint
    async fn close(self: Box<Self>);

    /// Address peers can reach this endpoint at, when the transport knows it
    fn local_address(&self) -> Option<String> {
        None
    }
}
