//! Configuration module
//!
//! Handles loading and saving hexaswitch configuration.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::NetworkConfig as ClientConfig;
use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Device port used when an address has none
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local address to send from (default: any)
    pub bind_address: Option<IpAddr>,
    /// Dial, send and receive timeout in ms
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    3000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: None,
            timeout_ms: default_timeout(),
        }
    }
}

/// Discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Number of EIDs to scan
    #[serde(default = "default_eid_count")]
    pub eid_count: u32,
    /// Probe writability with trial writes
    #[serde(default)]
    pub probe_writability: bool,
}

fn default_eid_count() -> u32 {
    64
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            eid_count: default_eid_count(),
            probe_writability: false,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("hexabus/config.toml")),
            Some(PathBuf::from("./hexabus.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Transport settings for a [`crate::network::Client`]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            port: self.network.port,
            bind_address: self.network.bind_address,
            timeout_ms: self.network.timeout_ms,
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    // bind_address stays unset so the socket follows the device's address family
    let config = Config {
        network: NetworkConfig::default(),
        discovery: DiscoveryConfig {
            eid_count: 96,
            probe_writability: false,
        },
    };

    Ok(toml::to_string_pretty(&config)?)
}
