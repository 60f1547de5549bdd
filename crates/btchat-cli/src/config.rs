//! BtChat CLI configuration
//!
//! A single TOML file holding the core configuration plus CLI settings.
//! Every section and field is optional; missing values take their defaults.

use std::path::Path;

use btchat_core::BtchatConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// Default listen address for `btchat host`
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7878";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the BtChat CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Discovery, service and session configuration
    pub core: BtchatConfig,

    /// CLI-specific configuration
    pub cli: CliConfig,

    /// BLE scanning configuration
    #[cfg(feature = "ble")]
    pub ble: btchat_ble::BleDiscoveryConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Address `host` listens on
    pub bind_address: String,

    /// Label for your own lines in the transcript
    pub display_name: String,

    /// Label for the peer's lines in the transcript
    pub peer_label: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            display_name: "Me".to_string(),
            peer_label: "Remote".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Loading and Saving
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), toml_string)?;
        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.core.validate()?;

        if self.cli.bind_address.trim().is_empty() {
            return Err(CliError::Config("Bind address must not be empty".to_string()));
        }
        if self.cli.display_name.trim().is_empty() || self.cli.peer_label.trim().is_empty() {
            return Err(CliError::Config(
                "Transcript labels must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Example configuration file content
    pub fn example_config() -> Result<String> {
        let example = AppConfig {
            cli: CliConfig {
                display_name: "Alice".to_string(),
                ..CliConfig::default()
            },
            ..AppConfig::default()
        };
        Ok(toml::to_string_pretty(&example)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
