//! Command handlers for the BtChat CLI

use std::sync::Arc;
use std::time::Duration;

use btchat_core::ConnectionRequest;
use btchat_runtime::{SessionManager, TcpTransport};
use tokio::io::BufReader;
use tracing::info;

use crate::app::ChatConsole;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, mut config: AppConfig) -> Result<()> {
        if let Some(name) = cli.name {
            config.cli.display_name = name;
        }

        match cli.command {
            Commands::Host { bind } => {
                if let Some(bind) = bind {
                    config.cli.bind_address = bind;
                }
                Self::handle_chat_command(config, ConnectionRequest::Listen).await
            }
            Commands::Connect { address } => {
                Self::handle_chat_command(config, ConnectionRequest::Connect { address }).await
            }
            Commands::Scan { duration_secs } => {
                Self::handle_scan_command(config, Duration::from_secs(duration_secs)).await
            }
            Commands::Config { output } => Self::handle_config_command(output),
        }
    }

    /// Run one chat session over TCP on stdin / stdout
    async fn handle_chat_command(config: AppConfig, request: ConnectionRequest) -> Result<()> {
        config.validate()?;
        info!("Starting {} session", request.role());

        let transport = Arc::new(TcpTransport::new(config.cli.bind_address.clone()));
        let manager = SessionManager::new(transport, config.core.clone());
        let console = ChatConsole::new(config.cli.clone());

        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        console.run(&manager, request, stdin, &mut stdout).await
    }

    /// Print the example configuration or write it to a file
    fn handle_config_command(output: Option<String>) -> Result<()> {
        let example = AppConfig::example_config()?;
        match output {
            Some(path) => {
                std::fs::write(&path, example)?;
                println!("Wrote example configuration to {}", path);
            }
            None => print!("{}", example),
        }
        Ok(())
    }

    #[cfg(not(feature = "ble"))]
    async fn handle_scan_command(_config: AppConfig, _duration: Duration) -> Result<()> {
        Err(crate::error::CliError::FeatureNotAvailable(
            "scanning requires building btchat with `--features ble`".to_string(),
        ))
    }

    /// Run the discovery cycle for `duration`, printing the device list as it
    /// changes
    #[cfg(feature = "ble")]
    async fn handle_scan_command(config: AppConfig, duration: Duration) -> Result<()> {
        use btchat_ble::BleDiscovery;
        use btchat_core::{ChatEvent, DeviceRegistry, EventBus};
        use btchat_runtime::DiscoveryCycle;
        use tokio::sync::{broadcast::error::RecvError, mpsc};
        use tracing::warn;

        use crate::app::format_device;

        config.validate()?;
        let ble = Arc::new(BleDiscovery::initialize(config.ble.clone()).await?);
        let events = EventBus::new(config.core.channels.event_buffer_size);
        let registry = Arc::new(DeviceRegistry::with_events(events.clone()));
        let cycle = DiscoveryCycle::new(
            ble.clone(),
            Arc::clone(&registry),
            events.clone(),
            config.core.discovery.clone(),
        );

        let (sender, receiver) = mpsc::channel(64);
        let forwarder = ble.spawn_event_forwarder(sender).await?;
        let pump = cycle.attach(receiver);
        let mut feed = events.subscribe();

        info!("Scanning for {}s", duration.as_secs());
        cycle.start().await;

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = feed.recv() => match event {
                    Ok(ChatEvent::DeviceListChanged { devices, .. }) => {
                        println!("--- {} device(s) ---", devices.len());
                        for device in &devices {
                            println!("{}", format_device(device));
                        }
                    }
                    Ok(ChatEvent::Error { message, .. }) => warn!("Discovery error: {}", message),
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }

        cycle.stop().await;
        forwarder.abort();
        pump.abort();

        println!("Found {} device(s)", registry.len());
        Ok(())
    }
}
