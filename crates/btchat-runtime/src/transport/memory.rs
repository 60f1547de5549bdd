//! In-memory transports
//!
//! [`MemoryNetwork`] connects [`MemoryTransport`]s in the same process over
//! `tokio::io::duplex` pipes, keyed by (address, service). [`MemoryDiscovery`]
//! records discovery passes so the cycle's timing can be observed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use btchat_core::{
    Accepted, BoxedStream, BtchatError, BtchatResult, DiscoveryTransport, PassiveEndpoint,
    StreamTransport, TransportError,
};
use hashbrown::HashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Pipe capacity per direction
const PIPE_CAPACITY: usize = 64 * 1024;

/// Pending inbound connections per endpoint
const ACCEPT_BACKLOG: usize = 4;

type ListenerKey = (String, Uuid);

// ----------------------------------------------------------------------------
// Memory Network
// ----------------------------------------------------------------------------

/// Shared rendezvous table for in-memory transports
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<Mutex<HashMap<ListenerKey, mpsc::Sender<Accepted>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose endpoints are reachable at `local_address`
    pub fn transport(&self, local_address: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            local_address: local_address.into(),
        }
    }

    /// Whether an open endpoint advertises `service` at `address`
    pub fn has_listener(&self, address: &str, service: Uuid) -> bool {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners
            .get(&(address.to_string(), service))
            .is_some_and(|sender| !sender.is_closed())
    }

    fn register(&self, key: ListenerKey, sender: mpsc::Sender<Accepted>) -> BtchatResult<()> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.get(&key).is_some_and(|existing| !existing.is_closed()) {
            return Err(TransportError::AddressInUse {
                address: format!("{}/{}", key.0, key.1),
            }
            .into());
        }
        listeners.insert(key, sender);
        Ok(())
    }

    fn lookup(&self, key: &ListenerKey) -> Option<mpsc::Sender<Accepted>> {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.get(key).filter(|s| !s.is_closed()).cloned()
    }

    fn unregister(&self, key: &ListenerKey) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.get(key).is_some_and(|sender| sender.is_closed()) {
            listeners.remove(key);
        }
    }
}

// ----------------------------------------------------------------------------
// Memory Stream Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_address: String,
}

impl MemoryTransport {
    pub fn local_address(&self) -> &str {
        &self.local_address
    }
}

#[async_trait]
impl StreamTransport for MemoryTransport {
    async fn listen(&self, service: Uuid) -> BtchatResult<Box<dyn PassiveEndpoint>> {
        let key = (self.local_address.clone(), service);
        let (sender, receiver) = mpsc::channel(ACCEPT_BACKLOG);
        self.network.register(key.clone(), sender)?;

        debug!("Memory endpoint open at {} for {}", key.0, service);
        Ok(Box::new(MemoryEndpoint {
            network: self.network.clone(),
            key,
            receiver,
        }))
    }

    async fn connect(&self, address: &str, service: Uuid) -> BtchatResult<BoxedStream> {
        let key = (address.to_string(), service);
        let sender = self
            .network
            .lookup(&key)
            .ok_or_else(|| BtchatError::connection_failed(address, "no listener for service"))?;

        let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
        let accepted = Accepted {
            stream: Box::new(far),
            peer: self.local_address.clone(),
        };
        sender
            .send(accepted)
            .await
            .map_err(|_| BtchatError::connection_failed(address, "listener closed"))?;

        debug!("Memory connection {} -> {}", self.local_address, address);
        Ok(Box::new(near))
    }
}

struct MemoryEndpoint {
    network: MemoryNetwork,
    key: ListenerKey,
    receiver: mpsc::Receiver<Accepted>,
}

#[async_trait]
impl PassiveEndpoint for MemoryEndpoint {
    async fn accept(&mut self) -> BtchatResult<Accepted> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| TransportError::EndpointClosed.into())
    }

    async fn close(self: Box<Self>) {
        debug!("Memory endpoint closed at {}", self.key.0);
    }

    fn local_address(&self) -> Option<String> {
        Some(self.key.0.clone())
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.receiver.close();
        self.network.unregister(&self.key);
    }
}

// ----------------------------------------------------------------------------
// Memory Discovery
// ----------------------------------------------------------------------------

/// Discovery transport that only records passes
#[derive(Debug)]
pub struct MemoryDiscovery {
    available: AtomicBool,
    discovering: AtomicBool,
    fail_next: AtomicBool,
    attempts: AtomicUsize,
    starts: AtomicUsize,
    cancels: AtomicUsize,
}

impl Default for MemoryDiscovery {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            discovering: AtomicBool::new(false),
            fail_next: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the scan permission being granted or missing
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next start fail with a non-capability error
    pub fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Simulate the running pass completing on its own
    pub fn finish_pass(&self) {
        self.discovering.store(false, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryTransport for MemoryDiscovery {
    async fn start_discovery(&self) -> BtchatResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(BtchatError::capability_unavailable("discovery"));
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BtchatError::discovery_failed("scan rejected"));
        }
        self.discovering.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cancel_discovery(&self) -> BtchatResult<()> {
        if self.discovering.swap(false, Ordering::SeqCst) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }
}
