//! De-duplicated registry of observed devices
//!
//! Mutated from the discovery event context while display collaborators read
//! snapshots. All mutations happen under one write lock and publish the
//! resulting snapshot before the lock is released, so subscribers see versions
//! in order and never a partially applied update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hashbrown::HashMap;
use tracing::debug;

use crate::device::Device;
use crate::events::{ChatEvent, DiscoveryEvent, EventBus};

// ----------------------------------------------------------------------------
// Device Registry
// ----------------------------------------------------------------------------

/// Mapping from device address to the most recent [`Device`] observed there
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    version: AtomicU64,
    events: Option<EventBus>,
}

impl DeviceRegistry {
    /// Registry that publishes nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that publishes `DeviceListChanged` after every mutation
    pub fn with_events(events: EventBus) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
            events: Some(events),
        }
    }

    /// Insert or replace the device at `address`; the latest observation wins
    pub fn observe(&self, address: &str, name: Option<&str>, rssi: i16) -> Device {
        let mut devices = self.write();
        let device = match devices.get(address) {
            Some(existing) => existing.with_observation(name, rssi),
            None => {
                debug!("Discovered new device {} ({:?}, {} dBm)", address, name, rssi);
                Device::new(address, name, rssi)
            }
        };
        devices.insert(address.to_string(), device.clone());
        self.commit(&devices);
        device
    }

    /// Rename a known device. Unknown addresses are ignored: a rename carries
    /// no signal strength to build a device from.
    pub fn rename(&self, address: &str, name: &str) -> Option<Device> {
        let mut devices = self.write();
        let renamed = devices.get(address)?.renamed(name);
        devices.insert(address.to_string(), renamed.clone());
        self.commit(&devices);
        Some(renamed)
    }

    /// Forget every device
    pub fn clear(&self) {
        let mut devices = self.write();
        devices.clear();
        self.commit(&devices);
    }

    /// Apply a transport event. Returns whether the registry changed.
    pub fn apply(&self, event: &DiscoveryEvent) -> bool {
        match event {
            DiscoveryEvent::Observed {
                address,
                name,
                rssi,
            } => {
                self.observe(address, name.as_deref(), *rssi);
                true
            }
            DiscoveryEvent::Renamed { address, name } => self.rename(address, name).is_some(),
            DiscoveryEvent::CapabilityChanged { .. } => false,
        }
    }

    /// Current devices ordered by address
    pub fn snapshot(&self) -> Vec<Device> {
        ordered(&self.read())
    }

    pub fn get(&self, address: &str) -> Option<Device> {
        self.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Incremented on every mutation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn commit(&self, devices: &HashMap<String, Device>) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(events) = &self.events {
            events.publish(ChatEvent::DeviceListChanged {
                version,
                devices: ordered(devices),
            });
        }
    }

    // A panic while holding the lock cannot leave a half-written entry: every
    // mutation is a single insert/clear, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Device>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Device>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ordered(devices: &HashMap<String, Device>) -> Vec<Device> {
    let mut snapshot: Vec<Device> = devices.values().cloned().collect();
    snapshot.sort_by(|a, b| a.address().cmp(b.address()));
    snapshot
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UNKNOWN_DEVICE_NAME;
    use std::sync::Arc;

    #[test]
    fn test_observe_is_idempotent() {
        let registry = DeviceRegistry::new();
        registry.observe("AA:BB", Some("Phone"), -60);
        registry.observe("AA:BB", Some("Phone"), -60);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot(), vec![Device::new("AA:BB", Some("Phone"), -60)]);
    }

    #[test]
    fn test_latest_observation_wins() {
        let registry = DeviceRegistry::new();
        registry.observe("AA:BB", Some("Phone"), -60);
        registry.observe("AA:BB", Some("Phone"), -90);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].rssi(), -90);
        assert_eq!(snapshot[0].quality(), 20);
    }

    #[test]
    fn test_observe_without_name_keeps_known_name() {
        let registry = DeviceRegistry::new();
        registry.observe("AA:BB", Some("Phone"), -60);
        let device = registry.observe("AA:BB", None, -70);
        assert_eq!(device.name(), "Phone");
    }

    #[test]
    fn test_first_observation_without_name_uses_placeholder() {
        let registry = DeviceRegistry::new();
        let device = registry.observe("AA:BB", None, -70);
        assert_eq!(device.name(), UNKNOWN_DEVICE_NAME);
    }

    #[test]
    fn test_rename_unknown_device_is_noop() {
        let registry = DeviceRegistry::new();
        registry.observe("AA:BB", None, -70);
        let version = registry.version();

        assert!(registry.rename("CC:DD", "Ghost").is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("CC:DD").is_none());
        assert_eq!(registry.version(), version);
    }

    #[test]
    fn test_rename_preserves_signal_strength() {
        let registry = DeviceRegistry::new();
        registry.observe("AA:BB", None, -75);
        let renamed = registry.rename("AA:BB", "Laptop").unwrap();

        assert_eq!(renamed.name(), "Laptop");
        assert_eq!(renamed.rssi(), -75);
        assert_eq!(renamed.quality(), 50);
    }

    #[test]
    fn test_clear_empties_snapshot() {
        let registry = DeviceRegistry::new();
        registry.observe("AA:BB", None, -70);
        registry.observe("CC:DD", None, -80);
        registry.clear();

        assert!(registry.snapshot().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_ordered_by_address() {
        let registry = DeviceRegistry::new();
        registry.observe("CC:DD", None, -70);
        registry.observe("00:11", None, -70);
        registry.observe("AA:BB", None, -70);

        let addresses: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|d| d.address().to_string())
            .collect();
        assert_eq!(addresses, vec!["00:11", "AA:BB", "CC:DD"]);
    }

    #[test]
    fn test_apply_events() {
        let registry = DeviceRegistry::new();
        assert!(registry.apply(&DiscoveryEvent::Observed {
            address: "AA:BB".to_string(),
            name: None,
            rssi: -80,
        }));
        assert!(registry.apply(&DiscoveryEvent::Renamed {
            address: "AA:BB".to_string(),
            name: "Watch".to_string(),
        }));
        assert!(!registry.apply(&DiscoveryEvent::Renamed {
            address: "EE:FF".to_string(),
            name: "Nobody".to_string(),
        }));
        assert!(!registry.apply(&DiscoveryEvent::CapabilityChanged { granted: true }));

        assert_eq!(registry.get("AA:BB").unwrap().name(), "Watch");
    }

    #[tokio::test]
    async fn test_mutations_publish_ordered_snapshots() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let registry = DeviceRegistry::with_events(bus);

        registry.observe("CC:DD", Some("Tablet"), -60);
        registry.observe("AA:BB", Some("Phone"), -90);
        registry.clear();

        match rx.recv().await.unwrap() {
            ChatEvent::DeviceListChanged { version, devices } => {
                assert_eq!(version, 1);
                assert_eq!(devices.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ChatEvent::DeviceListChanged { version, devices } => {
                assert_eq!(version, 2);
                assert_eq!(devices[0].address(), "AA:BB");
                assert_eq!(devices[1].address(), "CC:DD");
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ChatEvent::DeviceListChanged { version, devices } => {
                assert_eq!(version, 3);
                assert!(devices.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_readers_see_consistent_devices() {
        let registry = Arc::new(DeviceRegistry::new());

        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..500i16 {
                    let address = format!("AA:{:02}", i % 10);
                    registry.observe(&address, Some("Peer"), -100 + (i % 60));
                }
            })
        };

        for _ in 0..200 {
            for device in registry.snapshot() {
                assert_eq!(device.quality(), crate::device::quality(device.rssi()));
            }
            assert!(registry.len() <= 10);
        }

        writer.join().unwrap();
        assert_eq!(registry.len(), 10);
    }
}
