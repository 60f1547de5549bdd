//! TCP stream transport
//!
//! The initiator opens a socket and writes the 16-byte service identifier
//! before any chat bytes; the listener checks it against its own service.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use btchat_core::{
    Accepted, BoxedStream, BtchatError, BtchatResult, PassiveEndpoint, StreamTransport,
    TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Time allowed for the initiator to present the service identifier
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP stream transport.
///
/// A listener accepts exactly one connection: a stray connection that fails
/// the service handshake (a port scan, a peer with another UUID) ends the
/// listen attempt, so `btchat host` has to be started again.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind_address: String,
}

impl TcpTransport {
    /// Transport whose listeners bind `bind_address` (e.g. `0.0.0.0:7878`)
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }
}

#[async_trait]
impl StreamTransport for TcpTransport {
    async fn listen(&self, service: Uuid) -> BtchatResult<Box<dyn PassiveEndpoint>> {
        let listener = TcpListener::bind(&self.bind_address)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::AddrInUse => BtchatError::from(TransportError::AddressInUse {
                    address: self.bind_address.clone(),
                }),
                _ => BtchatError::from(e),
            })?;

        let local = listener.local_addr()?;
        info!("Listening on {} for service {}", local, service);
        Ok(Box::new(TcpEndpoint { listener, service }))
    }

    async fn connect(&self, address: &str, service: Uuid) -> BtchatResult<BoxedStream> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|e| BtchatError::connection_failed(address, e.to_string()))?;
        stream.set_nodelay(true)?;
        stream.write_all(service.as_bytes()).await?;
        stream.flush().await?;

        debug!("Connected to {}", address);
        Ok(Box::new(stream))
    }
}

struct TcpEndpoint {
    listener: TcpListener,
    service: Uuid,
}

#[async_trait]
impl PassiveEndpoint for TcpEndpoint {
    async fn accept(&mut self) -> BtchatResult<Accepted> {
        let (mut stream, addr) = self.listener.accept().await?;
        let peer = addr.to_string();
        stream.set_nodelay(true)?;

        let mut id = [0u8; 16];
        match timeout(HANDSHAKE_TIMEOUT, stream.read_exact(&mut id)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(BtchatError::connection_failed(peer, e.to_string())),
            Err(_) => {
                return Err(TransportError::Timeout {
                    peer,
                    duration_ms: HANDSHAKE_TIMEOUT.as_millis() as u64,
                }
                .into())
            }
        }

        let offered = Uuid::from_bytes(id);
        if offered != self.service {
            warn!("Rejecting {}: service {} does not match", peer, offered);
            return Err(BtchatError::connection_failed(peer, "service identifier mismatch"));
        }

        debug!("Accepted connection from {}", peer);
        Ok(Accepted {
            stream: Box::new(stream),
            peer,
        })
    }

    async fn close(self: Box<Self>) {
        debug!("TCP endpoint closed");
    }

    fn local_address(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btchat_core::SERVICE_UUID;

    #[tokio::test]
    async fn test_matching_service_is_accepted() {
        let transport = TcpTransport::new("127.0.0.1:0");
        let mut endpoint = transport.listen(SERVICE_UUID).await.unwrap();
        let address = endpoint.local_address().unwrap();

        let connector = tokio::spawn(async move {
            let mut stream = transport.connect(&address, SERVICE_UUID).await.unwrap();
            stream.write_all(b"hi").await.unwrap();
            stream
        });

        let mut accepted = endpoint.accept().await.unwrap();
        let mut buf = [0u8; 2];
        accepted.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        drop(connector.await.unwrap());
    }

    #[tokio::test]
    async fn test_mismatched_service_is_rejected() {
        let transport = TcpTransport::new("127.0.0.1:0");
        let mut endpoint = transport.listen(SERVICE_UUID).await.unwrap();
        let address = endpoint.local_address().unwrap();

        let connector = tokio::spawn(async move {
            transport.connect(&address, Uuid::new_v4()).await.unwrap()
        });

        let err = endpoint.accept().await.err().unwrap();
        assert!(matches!(
            err,
            BtchatError::Transport(TransportError::ConnectionFailed { .. })
        ));
        drop(connector.await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_failure() {
        let transport = TcpTransport::new("127.0.0.1:0");
        let endpoint = transport.listen(SERVICE_UUID).await.unwrap();
        let address = endpoint.local_address().unwrap();
        endpoint.close().await;

        let err = transport.connect(&address, SERVICE_UUID).await.err().unwrap();
        assert!(matches!(
            err,
            BtchatError::Transport(TransportError::ConnectionFailed { .. })
        ));
    }
}
