//! BLE device scanning

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use btchat_core::{BtchatResult, DiscoveryEvent, DiscoveryTransport};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BleDiscoveryConfig;
use crate::error::BleError;

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

/// Scans for nearby devices with one BLE adapter
pub struct BleDiscovery {
    config: BleDiscoveryConfig,
    adapter: Adapter,
    scanning: AtomicBool,
}

impl BleDiscovery {
    /// Open the configured adapter
    pub async fn initialize(config: BleDiscoveryConfig) -> Result<Self, BleError> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleError::ManagerUnavailable(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| BleError::ManagerUnavailable(e.to_string()))?;

        if adapters.is_empty() {
            return Err(BleError::AdapterNotAvailable);
        }

        let available = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleError::AdapterNotFound {
                index: config.adapter_index,
                available,
            })?;

        info!("BLE adapter {} initialized", config.adapter_index);
        Ok(Self {
            config,
            adapter,
            scanning: AtomicBool::new(false),
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Forward adapter events as discovery events until `sender` closes
    pub async fn spawn_event_forwarder(
        &self,
        sender: mpsc::Sender<DiscoveryEvent>,
    ) -> Result<JoinHandle<()>, BleError> {
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleError::EventStreamFailed(e.to_string()))?;
        let adapter = self.adapter.clone();
        let config = self.config.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };

                let Some(event) = describe(&adapter, &config, &id).await else {
                    continue;
                };
                if sender.send(event).await.is_err() {
                    debug!("Discovery receiver dropped, stopping BLE forwarder");
                    break;
                }
            }
        }))
    }
}

/// Turn an adapter sighting into a discovery event
async fn describe(
    adapter: &Adapter,
    config: &BleDiscoveryConfig,
    id: &btleplug::platform::PeripheralId,
) -> Option<DiscoveryEvent> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            debug!("Peripheral {:?} vanished: {}", id, e);
            return None;
        }
    };
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read peripheral properties: {}", e);
            return None;
        }
    };

    let name = properties.local_name;
    if !config.accepts(name.as_deref()) {
        return None;
    }

    let address = properties.address.to_string();
    match (properties.rssi, name) {
        (Some(rssi), name) => Some(DiscoveryEvent::Observed {
            address,
            name,
            rssi,
        }),
        // Name resolved without a fresh signal reading
        (None, Some(name)) => Some(DiscoveryEvent::Renamed { address, name }),
        (None, None) => None,
    }
}

#[async_trait]
impl DiscoveryTransport for BleDiscovery {
    async fn start_discovery(&self) -> BtchatResult<()> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(BleError::scan)?;
        self.scanning.store(true, Ordering::SeqCst);
        debug!("Started BLE scan");
        Ok(())
    }

    async fn cancel_discovery(&self) -> BtchatResult<()> {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| BleError::StopFailed(e.to_string()))?;
        debug!("Stopped BLE scan");
        Ok(())
    }

    fn is_discovering(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }
}
