//! Observed peer devices and their signal quality score

use serde::Serialize;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Display name used when the transport reports no name for a device
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

/// Signal strength reported when the transport carried no RSSI value
pub const RSSI_UNKNOWN: i16 = i16::MIN;

/// At or below this strength a link is unusable
const RSSI_FLOOR_DBM: i16 = -100;

/// At or above this strength a link is excellent
const RSSI_CEILING_DBM: i16 = -50;

// ----------------------------------------------------------------------------
// Quality Score
// ----------------------------------------------------------------------------

/// Map a received signal strength (dBm) to a 0-100 quality score.
///
/// Linear between -100 dBm (0) and -50 dBm (100), saturating outside that
/// range. [`RSSI_UNKNOWN`] falls below the floor and scores 0.
pub fn quality(rssi: i16) -> u8 {
    if rssi <= RSSI_FLOOR_DBM {
        return 0;
    }
    if rssi >= RSSI_CEILING_DBM {
        return 100;
    }
    // Range is (0, 100) here, so the narrowing is lossless.
    (2 * (rssi - RSSI_FLOOR_DBM)) as u8
}

// ----------------------------------------------------------------------------
// Device
// ----------------------------------------------------------------------------

/// One observed peer.
///
/// Immutable: updates build a new value through [`Device::with_observation`]
/// or [`Device::renamed`], so `quality` can never drift from `rssi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    address: String,
    name: String,
    rssi: i16,
    quality: u8,
}

impl Device {
    /// Create a device from a first sighting
    pub fn new(address: impl Into<String>, name: Option<&str>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            name: display_name(name),
            rssi,
            quality: quality(rssi),
        }
    }

    /// Stable transport address, the identity key
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last known signal strength in dBm, or [`RSSI_UNKNOWN`]
    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    /// Quality score in `[0, 100]` derived from [`Device::rssi`]
    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn has_known_rssi(&self) -> bool {
        self.rssi != RSSI_UNKNOWN
    }

    /// A later sighting: new strength, and the new name when one was reported
    pub fn with_observation(&self, name: Option<&str>, rssi: i16) -> Self {
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.name.clone(),
        };
        Self {
            address: self.address.clone(),
            name,
            rssi,
            quality: quality(rssi),
        }
    }

    /// Same device under a new name, keeping the last known strength
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            address: self.address.clone(),
            name: display_name(Some(name)),
            rssi: self.rssi,
            quality: self.quality,
        }
    }
}

fn display_name(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_DEVICE_NAME.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
