//! Session manager
//!
//! Owns the single connection slot of a host: at most one establisher or
//! chat session at a time. Requests arriving while the slot is busy are
//! rejected rather than queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use btchat_core::{
    BtchatConfig, BtchatResult, ChatEvent, ConnectionRequest, ErrorContext, EventBus, Role,
    SessionConfig, SessionError, SessionState, StreamTransport,
};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::ChatSession;
use crate::establish::{CancelHandle, ConnectionEstablisher, Establish};

enum Slot {
    Vacant,
    Establishing {
        generation: u64,
        role: Role,
        cancel: CancelHandle,
        task: JoinHandle<()>,
    },
    Active {
        role: Role,
        session: Arc<ChatSession>,
    },
}

impl Slot {
    fn busy_role(&self) -> Option<Role> {
        match self {
            Slot::Vacant => None,
            Slot::Establishing { role, .. } => Some(*role),
            Slot::Active { role, session } => (!session.is_stopped()).then_some(*role),
        }
    }

    fn is_establishing(&self, generation: u64) -> bool {
        matches!(self, Slot::Establishing { generation: g, .. } if *g == generation)
    }
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

pub struct SessionManager {
    transport: Arc<dyn StreamTransport>,
    config: BtchatConfig,
    events: EventBus,
    slot: Arc<Mutex<Slot>>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn StreamTransport>, config: BtchatConfig) -> Self {
        let events = EventBus::new(config.channels.event_buffer_size);
        Self::with_events(transport, config, events)
    }

    /// Manager publishing on an existing bus
    pub fn with_events(
        transport: Arc<dyn StreamTransport>,
        config: BtchatConfig,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            config,
            events,
            slot: Arc::new(Mutex::new(Slot::Vacant)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Take the Listener role
    pub async fn host(&self) -> BtchatResult<()> {
        self.handle_request(ConnectionRequest::Listen).await
    }

    /// Take the Initiator role towards `address`
    pub async fn connect(&self, address: &str) -> BtchatResult<()> {
        self.handle_request(ConnectionRequest::Connect {
            address: address.to_string(),
        })
        .await
    }

    /// Start establishing in the background. Fails while another session
    /// is pending or connected.
    pub async fn handle_request(&self, request: ConnectionRequest) -> BtchatResult<()> {
        let mut slot = self.slot.lock().await;
        if let Some(role) = slot.busy_role() {
            warn!("Rejecting {:?}: a {} session is active", request, role);
            return Err(SessionError::AlreadyActive { role }.into());
        }

        let service = self.config.service.service_uuid;
        let (establisher, peer) = match request {
            ConnectionRequest::Listen => (
                ConnectionEstablisher::listener(Arc::clone(&self.transport), service),
                None,
            ),
            ConnectionRequest::Connect { address } => (
                ConnectionEstablisher::initiator(
                    Arc::clone(&self.transport),
                    address.clone(),
                    service,
                    self.config.session.connect_timeout(),
                ),
                Some(address),
            ),
        };

        let role = establisher.role();
        let cancel = establisher.cancel_handle();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.events.publish_state(role, role.pending_state(), peer);
        let task = tokio::spawn(drive(
            establisher,
            generation,
            Arc::clone(&self.slot),
            self.events.clone(),
            self.config.session.clone(),
        ));
        *slot = Slot::Establishing {
            generation,
            role,
            cancel,
            task,
        };

        info!("Started {} session #{}", role, generation);
        Ok(())
    }

    /// Send on the connected session
    pub async fn send(&self, text: &str) -> BtchatResult<()> {
        let session = match &*self.slot.lock().await {
            Slot::Active { session, .. } if !session.is_stopped() => Arc::clone(session),
            _ => return Err(SessionError::NoActiveSession.into()),
        };
        session.send(text).await
    }

    /// Cancel a pending establishment or close the connected session
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock().await, Slot::Vacant);
        match previous {
            Slot::Vacant => {}
            Slot::Establishing { cancel, task, .. } => {
                cancel.cancel();
                if let Err(e) = task.await {
                    warn!("Establish task ended abnormally: {}", e);
                }
            }
            Slot::Active { session, .. } => session.stop().await,
        }
    }

    pub async fn state(&self) -> SessionState {
        match &*self.slot.lock().await {
            Slot::Vacant => SessionState::Idle,
            Slot::Establishing { role, .. } => role.pending_state(),
            Slot::Active { session, .. } if session.is_stopped() => SessionState::Closed,
            Slot::Active { .. } => SessionState::Connected,
        }
    }

    /// Peer of the connected session
    pub async fn peer(&self) -> Option<String> {
        match &*self.slot.lock().await {
            Slot::Active { session, .. } => Some(session.peer().to_string()),
            _ => None,
        }
    }
}

async fn drive(
    mut establisher: ConnectionEstablisher,
    generation: u64,
    slot: Arc<Mutex<Slot>>,
    events: EventBus,
    config: SessionConfig,
) {
    let role = establisher.role();
    let result = establisher.establish().await;

    let mut slot = slot.lock().await;
    let current = slot.is_establishing(generation);

    match result {
        Ok(established) => {
            let peer = established.peer.clone();
            let session = Arc::new(ChatSession::new(established, &config, events.clone()));
            events.publish_state(role, SessionState::Connected, Some(peer.clone()));

            if !current {
                drop(slot);
                debug!("Session #{} superseded, closing {}", generation, peer);
                session.stop().await;
                return;
            }

            if let Err(e) = session.start().await {
                warn!("Failed to start chat with {}: {}", peer, e);
                events.publish_error(ErrorContext::Session, &e);
            }
            *slot = Slot::Active { role, session };
        }
        Err(e) => {
            if current {
                *slot = Slot::Vacant;
            }
            drop(slot);

            if !e.is_cancelled() {
                events.publish_error(ErrorContext::Connection, &e);
            }
            events.publish_state(role, SessionState::Failed, None);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
