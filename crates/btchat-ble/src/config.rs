//! BLE discovery configuration

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for BLE discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleDiscoveryConfig {
    /// Which adapter to scan with when several are present
    pub adapter_index: usize,
    /// Only report devices whose advertised name starts with this prefix
    pub device_name_prefix: Option<String>,
}

impl BleDiscoveryConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set adapter index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set device name prefix
    pub fn with_device_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.device_name_prefix = Some(prefix.into());
        self
    }

    /// Whether a device advertising `name` passes the prefix filter.
    /// Unnamed devices pass only when no prefix is set.
    pub fn accepts(&self, name: Option<&str>) -> bool {
        match (&self.device_name_prefix, name) {
            (None, _) => true,
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accepts_everything() {
        let config = BleDiscoveryConfig::default();
        assert!(config.accepts(Some("Phone")));
        assert!(config.accepts(None));
    }

    #[test]
    fn test_prefix_filters_names() {
        let config = BleDiscoveryConfig::new().with_device_name_prefix("BtChat");
        assert!(config.accepts(Some("BtChat-42")));
        assert!(!config.accepts(Some("Headphones")));
        assert!(!config.accepts(None));
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: BleDiscoveryConfig = serde_json::from_str(r#"{"adapter_index": 1}"#).unwrap();
        assert_eq!(config.adapter_index, 1);
        assert_eq!(config.device_name_prefix, None);
    }
}
