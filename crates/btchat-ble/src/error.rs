//! Error types for BLE discovery

use btchat_core::BtchatError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE discovery transport
#[derive(Error, Debug)]
pub enum BleError {
    #[error("Failed to create BLE manager: {0}")]
    ManagerUnavailable(String),

    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("BLE adapter {index} not found ({available} available)")]
    AdapterNotFound { index: usize, available: usize },

    #[error("Bluetooth scan permission denied")]
    PermissionDenied,

    #[error("Failed to start BLE scan: {0}")]
    ScanFailed(String),

    #[error("Failed to stop BLE scan: {0}")]
    StopFailed(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),
}

impl BleError {
    /// Classify a btleplug failure raised while scanning
    pub(crate) fn scan(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => BleError::PermissionDenied,
            other => BleError::ScanFailed(other.to_string()),
        }
    }
}

impl From<BleError> for BtchatError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::PermissionDenied => BtchatError::capability_unavailable("bluetooth scan"),
            BleError::AdapterNotAvailable | BleError::AdapterNotFound { .. } => {
                BtchatError::config_error(err.to_string())
            }
            other => BtchatError::discovery_failed(other.to_string()),
        }
    }
}
