//! Connection establishment
//!
//! Two mutually exclusive roles produce exactly one open stream:
//!
//! - [`Listener`] opens a passive endpoint, accepts one inbound connection and
//!   closes the endpoint whatever the outcome
//! - [`Initiator`] connects to a known peer address
//!
//! Both block until they finish, fail or are cancelled through their
//! [`CancelHandle`]. Neither retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btchat_core::{
    BoxedStream, BtchatError, BtchatResult, Role, SessionError, SessionState, StreamTransport,
    TransportError,
};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------------

/// Unblocks a pending establishment from another task
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

async fn cancelled(mut receiver: watch::Receiver<bool>) {
    if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender gone: nobody can cancel any more
        std::future::pending::<()>().await;
    }
}

// ----------------------------------------------------------------------------
// Establish Trait
// ----------------------------------------------------------------------------

/// An open stream and the peer on the other end
pub struct Established {
    pub role: Role,
    pub peer: String,
    pub stream: BoxedStream,
}

impl core::fmt::Debug for Established {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Established")
            .field("role", &self.role)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Establish: Send {
    fn role(&self) -> Role;

    fn state(&self) -> SessionState;

    fn cancel_handle(&self) -> CancelHandle;

    /// Run the role once. Leaves the pending state exactly once, into
    /// `Connected` or `Failed`.
    async fn establish(&mut self) -> BtchatResult<Established>;
}

fn ensure_idle(state: SessionState) -> BtchatResult<()> {
    if state != SessionState::Idle {
        return Err(SessionError::InvalidState {
            expected: SessionState::Idle,
            actual: state,
        }
        .into());
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

pub struct Listener {
    transport: Arc<dyn StreamTransport>,
    service: Uuid,
    state: SessionState,
    cancel: CancelHandle,
}

impl Listener {
    pub fn new(transport: Arc<dyn StreamTransport>, service: Uuid) -> Self {
        Self {
            transport,
            service,
            state: SessionState::Idle,
            cancel: CancelHandle::new(),
        }
    }

    async fn accept_one(&mut self) -> BtchatResult<Established> {
        let mut endpoint = self.transport.listen(self.service).await?;
        if let Some(address) = endpoint.local_address() {
            info!("Waiting for a connection on {}", address);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancelled(self.cancel.subscribe()) => Err(TransportError::Cancelled.into()),
            accepted = endpoint.accept() => accepted,
        };

        // Exactly one connection per listen
        endpoint.close().await;

        let accepted = outcome?;
        Ok(Established {
            role: Role::Listener,
            peer: accepted.peer,
            stream: accepted.stream,
        })
    }
}

#[async_trait]
impl Establish for Listener {
    fn role(&self) -> Role {
        Role::Listener
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    async fn establish(&mut self) -> BtchatResult<Established> {
        ensure_idle(self.state)?;
        self.state = SessionState::Listening;

        let result = self.accept_one().await;
        self.state = finish(Role::Listener, &result);
        result
    }
}

// ----------------------------------------------------------------------------
// Initiator
// ----------------------------------------------------------------------------

pub struct Initiator {
    transport: Arc<dyn StreamTransport>,
    address: String,
    service: Uuid,
    connect_timeout: Option<Duration>,
    state: SessionState,
    cancel: CancelHandle,
}

impl Initiator {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        address: impl Into<String>,
        service: Uuid,
        connect_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            address: address.into(),
            service,
            connect_timeout,
            state: SessionState::Idle,
            cancel: CancelHandle::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect_once(&self) -> BtchatResult<BoxedStream> {
        let connect = self.transport.connect(&self.address, self.service);
        match self.connect_timeout {
            Some(limit) => timeout(limit, connect).await.map_err(|_| {
                BtchatError::from(TransportError::Timeout {
                    peer: self.address.clone(),
                    duration_ms: limit.as_millis() as u64,
                })
            })?,
            None => connect.await,
        }
    }
}

#[async_trait]
impl Establish for Initiator {
    fn role(&self) -> Role {
        Role::Initiator
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    async fn establish(&mut self) -> BtchatResult<Established> {
        ensure_idle(self.state)?;
        self.state = SessionState::Connecting;
        debug!("Connecting to {}", self.address);

        let result = tokio::select! {
            biased;
            _ = cancelled(self.cancel.subscribe()) => Err(TransportError::Cancelled.into()),
            stream = self.connect_once() => stream.map(|stream| Established {
                role: Role::Initiator,
                peer: self.address.clone(),
                stream,
            }),
        };

        self.state = finish(Role::Initiator, &result);
        result
    }
}

fn finish(role: Role, result: &BtchatResult<Established>) -> SessionState {
    match result {
        Ok(established) => {
            info!("{} connected to {}", role, established.peer);
            SessionState::Connected
        }
        Err(e) if e.is_cancelled() => {
            debug!("{} cancelled", role);
            SessionState::Failed
        }
        Err(e) => {
            warn!("{} failed: {}", role, e);
            SessionState::Failed
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Establisher
// ----------------------------------------------------------------------------

/// Either role, selected at construction
pub enum ConnectionEstablisher {
    Listener(Listener),
    Initiator(Initiator),
}

impl ConnectionEstablisher {
    pub fn listener(transport: Arc<dyn StreamTransport>, service: Uuid) -> Self {
        ConnectionEstablisher::Listener(Listener::new(transport, service))
    }

    pub fn initiator(
        transport: Arc<dyn StreamTransport>,
        address: impl Into<String>,
        service: Uuid,
        connect_timeout: Option<Duration>,
    ) -> Self {
        ConnectionEstablisher::Initiator(Initiator::new(
            transport,
            address,
            service,
            connect_timeout,
        ))
    }
}

#[async_trait]
impl Establish for ConnectionEstablisher {
    fn role(&self) -> Role {
        match self {
            ConnectionEstablisher::Listener(l) => l.role(),
            ConnectionEstablisher::Initiator(i) => i.role(),
        }
    }

    fn state(&self) -> SessionState {
        match self {
            ConnectionEstablisher::Listener(l) => l.state(),
            ConnectionEstablisher::Initiator(i) => i.state(),
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        match self {
            ConnectionEstablisher::Listener(l) => l.cancel_handle(),
            ConnectionEstablisher::Initiator(i) => i.cancel_handle(),
        }
    }

    async fn establish(&mut self) -> BtchatResult<Established> {
        match self {
            ConnectionEstablisher::Listener(l) => l.establish().await,
            ConnectionEstablisher::Initiator(i) => i.establish().await,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryNetwork;
    use btchat_core::SERVICE_UUID;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn wait_for_listener(network: &MemoryNetwork, address: &str) {
        while !network.has_listener(address, SERVICE_UUID) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_listener_and_initiator_meet() {
        let network = MemoryNetwork::new();
        let mut listener = Listener::new(Arc::new(network.transport("AA:AA")), SERVICE_UUID);
        let accept = tokio::spawn(async move {
            let established = listener.establish().await;
            (listener.state(), established)
        });

        wait_for_listener(&network, "AA:AA").await;
        let mut initiator = ConnectionEstablisher::initiator(
            Arc::new(network.transport("BB:BB")),
            "AA:AA",
            SERVICE_UUID,
            None,
        );
        let mut outbound = initiator.establish().await.unwrap();
        assert_eq!(initiator.state(), SessionState::Connected);
        assert_eq!(outbound.peer, "AA:AA");

        let (state, inbound) = accept.await.unwrap();
        let mut inbound = inbound.unwrap();
        assert_eq!(state, SessionState::Connected);
        assert_eq!(inbound.role, Role::Listener);
        assert_eq!(inbound.peer, "BB:BB");

        outbound.stream.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        inbound.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        // Endpoint released after the single accept
        assert!(!network.has_listener("AA:AA", SERVICE_UUID));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_listener_and_releases_endpoint() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.transport("AA:AA"));
        let mut listener = Listener::new(transport.clone(), SERVICE_UUID);
        let cancel = listener.cancel_handle();
        let accept = tokio::spawn(async move {
            let result = listener.establish().await;
            (listener.state(), result)
        });

        wait_for_listener(&network, "AA:AA").await;
        cancel.cancel();

        let (state, result) = accept.await.unwrap();
        assert_eq!(state, SessionState::Failed);
        assert!(result.unwrap_err().is_cancelled());

        // A fresh listener can bind the same service again
        let mut again = Listener::new(transport, SERVICE_UUID);
        let cancel = again.cancel_handle();
        cancel.cancel();
        assert!(again.establish().await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_initiator_to_unknown_address_fails() {
        let network = MemoryNetwork::new();
        let mut initiator = Initiator::new(
            Arc::new(network.transport("BB:BB")),
            "CC:CC",
            SERVICE_UUID,
            None,
        );

        let err = initiator.establish().await.unwrap_err();
        assert!(matches!(
            err,
            BtchatError::Transport(TransportError::ConnectionFailed { .. })
        ));
        assert_eq!(initiator.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_establish_runs_only_once() {
        let network = MemoryNetwork::new();
        let mut initiator = Initiator::new(
            Arc::new(network.transport("BB:BB")),
            "CC:CC",
            SERVICE_UUID,
            None,
        );
        let _ = initiator.establish().await;

        let err = initiator.establish().await.unwrap_err();
        assert!(matches!(
            err,
            BtchatError::Session(SessionError::InvalidState {
                actual: SessionState::Failed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_fails_fast() {
        let network = MemoryNetwork::new();
        let mut initiator = ConnectionEstablisher::initiator(
            Arc::new(network.transport("BB:BB")),
            "CC:CC",
            SERVICE_UUID,
            Some(Duration::from_secs(1)),
        );
        initiator.cancel_handle().cancel();

        assert!(initiator.establish().await.unwrap_err().is_cancelled());
        assert_eq!(initiator.role(), Role::Initiator);
    }
}
