//! Centralized Configuration Management
//!
//! Every knob the core and runtime read: discovery cadence, the rendezvous
//! service identifier, session I/O limits and event channel sizing.

use core::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BtchatError, BtchatResult};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Rendezvous identifier shared by both peers (Serial Port Profile UUID)
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Service record name advertised by a listener
pub const SERVICE_NAME: &str = "BtChat";

/// Default discovery restart cadence.
///
/// A classic inquiry runs for several seconds, so restarting every 500ms would
/// cancel each pass before it reports anything.
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 5_000;

/// Bytes requested per read call; one read is one message
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

// ----------------------------------------------------------------------------
// Discovery Configuration
// ----------------------------------------------------------------------------

/// Configuration for the periodic discovery cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Interval between discovery restarts in milliseconds
    pub interval_ms: u64,
    /// Empty the registry when the cycle starts
    pub clear_on_start: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_DISCOVERY_INTERVAL_MS,
            clear_on_start: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Set the restart interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_clear_on_start(mut self, enabled: bool) -> Self {
        self.clear_on_start = enabled;
        self
    }
}

// ----------------------------------------------------------------------------
// Service Configuration
// ----------------------------------------------------------------------------

/// Rendezvous service both roles agree on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service_uuid: Uuid,
    pub service_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID,
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// I/O limits for connection establishment and chat sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bytes per read call
    pub read_buffer_size: usize,
    /// Give up on an outbound connection after this long (None waits forever)
    pub connect_timeout_ms: Option<u64>,
    /// Fail a send that cannot complete within this long
    pub write_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            connect_timeout_ms: Some(15_000),
            write_timeout_ms: 5_000,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Set bytes per read call
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set outbound connection timeout
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Set write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of the outbound event bus; slow subscribers past this lag
    pub event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 256,
        }
    }
}

// ----------------------------------------------------------------------------
// Aggregate Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the core and runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BtchatConfig {
    pub discovery: DiscoveryConfig,
    pub service: ServiceConfig,
    pub session: SessionConfig,
    pub channels: ChannelConfig,
}

impl BtchatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Reject values the runtime cannot operate with
    pub fn validate(&self) -> BtchatResult<()> {
        if self.discovery.interval_ms == 0 {
            return Err(BtchatError::config_error(
                "discovery.interval_ms must be greater than zero",
            ));
        }
        if self.session.read_buffer_size == 0 {
            return Err(BtchatError::config_error(
                "session.read_buffer_size must be greater than zero",
            ));
        }
        if self.session.write_timeout_ms == 0 {
            return Err(BtchatError::config_error(
                "session.write_timeout_ms must be greater than zero",
            ));
        }
        if self.channels.event_buffer_size == 0 {
            return Err(BtchatError::config_error(
                "channels.event_buffer_size must be greater than zero",
            ));
        }
        if self.service.service_uuid.is_nil() {
            return Err(BtchatError::config_error("service.service_uuid must not be nil"));
        }
        Ok(())
    }
}
