//! Chat session over an established stream
//!
//! A session owns one stream. A dedicated read task delivers every chunk a
//! single read returns as one received message; writes go straight to the
//! stream from the caller's task. The session closes exactly once, whether
//! the peer hangs up, a read fails or the owner stops it.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btchat_core::{
    BoxedStream, BtchatResult, ChatEvent, ChatMessage, ErrorContext, EventBus, Role,
    SessionConfig, SessionError, SessionState, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::establish::Established;

/// Lifecycle of a [`ChatSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Running,
    Stopped,
}

impl ChatState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChatState::Idle,
            1 => ChatState::Running,
            _ => ChatState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ChatState::Idle => 0,
            ChatState::Running => 1,
            ChatState::Stopped => 2,
        }
    }
}

enum CloseReason {
    Local,
    PeerClosed,
    ReadFailed(io::Error),
}

// ----------------------------------------------------------------------------
// Shared Session State
// ----------------------------------------------------------------------------

struct Shared {
    role: Role,
    peer: String,
    state: AtomicU8,
    closed: AtomicBool,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    shutdown: watch::Sender<bool>,
    events: EventBus,
    read_buffer_size: usize,
    write_timeout: Duration,
}

impl Shared {
    fn state(&self) -> ChatState {
        ChatState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Release the stream and announce `Closed`. Runs once per session.
    async fn close(&self, reason: CloseReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.state
            .store(ChatState::Stopped.as_u8(), Ordering::SeqCst);
        self.shutdown.send_replace(true);

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Stream shutdown for {} failed: {}", self.peer, e);
            }
        }

        match reason {
            CloseReason::Local => info!("Chat with {} closed", self.peer),
            CloseReason::PeerClosed => info!("Peer {} closed the connection", self.peer),
            CloseReason::ReadFailed(e) => {
                warn!("Read from {} failed: {}", self.peer, e);
                self.events.publish_error(ErrorContext::Session, &e);
            }
        }

        self.events
            .publish_state(self.role, SessionState::Closed, Some(self.peer.clone()));
    }
}

// ----------------------------------------------------------------------------
// Chat Session
// ----------------------------------------------------------------------------

pub struct ChatSession {
    shared: Arc<Shared>,
    reader: Mutex<Option<ReadHalf<BoxedStream>>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    pub fn new(established: Established, config: &SessionConfig, events: EventBus) -> Self {
        let (reader, writer) = tokio::io::split(established.stream);
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                role: established.role,
                peer: established.peer,
                state: AtomicU8::new(ChatState::Idle.as_u8()),
                closed: AtomicBool::new(false),
                writer: Mutex::new(Some(writer)),
                shutdown,
                events,
                read_buffer_size: config.read_buffer_size.max(1),
                write_timeout: config.write_timeout(),
            }),
            reader: Mutex::new(Some(reader)),
            read_task: Mutex::new(None),
        }
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    pub fn state(&self) -> ChatState {
        self.shared.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ChatState::Stopped
    }

    /// Spawn the read loop
    pub async fn start(&self) -> BtchatResult<()> {
        let Some(reader) = self.reader.lock().await.take() else {
            return Err(match self.state() {
                ChatState::Stopped => SessionError::NotRunning,
                _ => SessionError::AlreadyStarted,
            }
            .into());
        };

        if self
            .shared
            .state
            .compare_exchange(
                ChatState::Idle.as_u8(),
                ChatState::Running.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(SessionError::NotRunning.into());
        }

        let task = tokio::spawn(read_loop(Arc::clone(&self.shared), reader));
        *self.read_task.lock().await = Some(task);

        debug!("Chat with {} started", self.shared.peer);
        Ok(())
    }

    /// Write `text` to the peer and echo it as a sent message
    pub async fn send(&self, text: &str) -> BtchatResult<()> {
        if self.state() != ChatState::Running {
            return Err(SessionError::NotRunning.into());
        }

        // Subscribed before locking so a close racing this send is seen
        let mut shutdown = self.shared.shutdown.subscribe();
        let mut writer = self.shared.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(SessionError::NotRunning.into());
        };

        let write = async {
            stream.write_all(text.as_bytes()).await?;
            stream.flush().await
        };
        // Close wins over a write stuck on a peer that stopped reading
        let outcome = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                debug!("Send to {} abandoned, session closing", self.shared.peer);
                return Err(SessionError::NotRunning.into());
            }
            outcome = timeout(self.shared.write_timeout, write) => outcome,
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Write to {} failed: {}", self.shared.peer, e);
                return Err(TransportError::StreamIo(e).into());
            }
            Err(_) => {
                return Err(SessionError::WriteTimeout {
                    duration_ms: self.shared.write_timeout.as_millis() as u64,
                }
                .into())
            }
        }
        drop(writer);

        self.shared.events.publish(ChatEvent::Message {
            peer: self.shared.peer.clone(),
            message: ChatMessage::sent(text),
        });
        Ok(())
    }

    /// Close the stream and wait for the read loop to exit. Idempotent.
    pub async fn stop(&self) {
        self.shared.close(CloseReason::Local).await;
        self.reader.lock().await.take();

        let task = self.read_task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Read task for {} ended abnormally: {}", self.shared.peer, e);
            }
        }
    }
}

async fn shutdown_requested(receiver: &mut watch::Receiver<bool>) {
    let _ = receiver.wait_for(|stop| *stop).await;
}

async fn read_loop(shared: Arc<Shared>, mut reader: ReadHalf<BoxedStream>) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut buffer = vec![0u8; shared.read_buffer_size];

    let reason = loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break None,
            read = reader.read(&mut buffer) => match read {
                Ok(0) => break Some(CloseReason::PeerClosed),
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buffer[..n]).into_owned();
                    shared.events.publish(ChatEvent::Message {
                        peer: shared.peer.clone(),
                        message: ChatMessage::received(text),
                    });
                }
                Err(e) => break Some(CloseReason::ReadFailed(e)),
            },
        }
    };

    if let Some(reason) = reason {
        shared.close(reason).await;
    }
    debug!("Read loop for {} exited", shared.peer);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
