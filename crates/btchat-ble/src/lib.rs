//! Bluetooth Low Energy discovery for BtChat
//!
//! Implements [`DiscoveryTransport`](btchat_core::DiscoveryTransport) over
//! btleplug's central-mode scanning and forwards what the adapter sees as
//! [`DiscoveryEvent`](btchat_core::DiscoveryEvent)s.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use btchat_ble::{BleDiscovery, BleDiscoveryConfig};
//! use btchat_core::{DeviceRegistry, DiscoveryConfig, EventBus};
//! use btchat_runtime::DiscoveryCycle;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ble = Arc::new(BleDiscovery::initialize(BleDiscoveryConfig::default()).await?);
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! ble.spawn_event_forwarder(tx).await?;
//!
//! let events = EventBus::default();
//! let registry = Arc::new(DeviceRegistry::with_events(events.clone()));
//! let cycle = DiscoveryCycle::new(ble, registry, events, DiscoveryConfig::default());
//! cycle.attach(rx);
//! cycle.start().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod discovery;
mod error;

pub use config::BleDiscoveryConfig;
pub use discovery::BleDiscovery;
pub use error::BleError;
