//! Line-based chat console
//!
//! Drives one session through a [`SessionManager`]: waits for the connection,
//! then forwards typed lines to the peer and prints the transcript from the
//! event feed until either side hangs up or `/quit` is entered.

use btchat_core::{ChatEvent, ChatMessage, ConnectionRequest, Device, Direction, SessionState};
use btchat_runtime::SessionManager;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::config::CliConfig;
use crate::error::{CliError, Result};

/// Input line that leaves the chat
pub const QUIT_COMMAND: &str = "/quit";

pub struct ChatConsole {
    config: CliConfig,
}

impl ChatConsole {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    /// Transcript line for a chat message
    pub fn format_message(&self, message: &ChatMessage) -> String {
        let label = match message.direction {
            Direction::Sent => &self.config.display_name,
            Direction::Received => &self.config.peer_label,
        };
        format!("{}: {}", label, message.text)
    }

    /// Take the requested role and chat until the session ends
    pub async fn run<R, W>(
        &self,
        manager: &SessionManager,
        request: ConnectionRequest,
        input: R,
        output: &mut W,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut events = manager.subscribe();
        manager.handle_request(request).await?;

        let outcome = match self.wait_connected(&mut events, output).await {
            Ok(()) => self.chat(manager, &mut events, input, output).await,
            Err(e) => Err(e),
        };

        manager.stop().await;
        outcome
    }

    async fn wait_connected<W>(
        &self,
        events: &mut broadcast::Receiver<ChatEvent>,
        output: &mut W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut last_error = None;
        loop {
            match events.recv().await {
                Ok(ChatEvent::SessionStateChanged { state, peer, .. }) => match state {
                    SessionState::Listening => {
                        let line = format!("Waiting for a peer on {}...", self.config.bind_address);
                        emit(output, &line).await?;
                    }
                    SessionState::Connecting => {
                        let line = format!("Connecting to {}...", peer.unwrap_or_default());
                        emit(output, &line).await?;
                    }
                    SessionState::Connected => {
                        let line = format!(
                            "Connected to {}. Type {} to leave.",
                            peer.unwrap_or_default(),
                            QUIT_COMMAND
                        );
                        emit(output, &line).await?;
                        return Ok(());
                    }
                    SessionState::Failed => {
                        return Err(CliError::Connection(
                            last_error.unwrap_or_else(|| "cancelled".to_string()),
                        ));
                    }
                    _ => {}
                },
                Ok(ChatEvent::Error { message, .. }) => last_error = Some(message),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Console fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    return Err(CliError::Connection("event feed closed".to_string()));
                }
            }
        }
    }

    async fn chat<R, W>(
        &self,
        manager: &SessionManager,
        events: &mut broadcast::Receiver<ChatEvent>,
        input: R,
        output: &mut W,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(ChatEvent::Message { message, .. }) => {
                        emit(output, &self.format_message(&message)).await?;
                    }
                    Ok(ChatEvent::SessionStateChanged { state: SessionState::Closed, .. }) => {
                        emit(output, "Connection closed.").await?;
                        return Ok(());
                    }
                    Ok(ChatEvent::Error { context, message }) => {
                        emit(output, &format!("Error ({}): {}", context, message)).await?;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Console fell behind, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
                line = lines.next_line() => match line? {
                    Some(line) if line.trim() == QUIT_COMMAND => {
                        debug!("Leaving chat");
                        return Ok(());
                    }
                    Some(line) if line.is_empty() => {}
                    Some(line) => {
                        if let Err(e) = manager.send(&line).await {
                            emit(output, &format!("Send failed: {}", e)).await?;
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

/// One line of the device list printed by `btchat scan`
pub fn format_device(device: &Device) -> String {
    if device.has_known_rssi() {
        format!(
            "{:<20} {:<24} {:>4} dBm {:>3}%",
            device.address(),
            device.name(),
            device.rssi(),
            device.quality()
        )
    } else {
        format!("{:<20} {:<24}      ?    0%", device.address(), device.name())
    }
}

async fn emit<W>(output: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
