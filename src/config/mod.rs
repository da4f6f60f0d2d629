//! Configuration module
//!
//! Handles loading and saving RemoteLink configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::connection::ConnectionConfig;
use crate::protocol::{self, Acknowledgement};
use crate::transport::UdpTransportConfig;

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

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Protocol engine settings
    pub link: LinkConfig,

    /// UDP transport settings
    pub udp: UdpTransportConfig,
}

/// Settings shared by every connection, whatever the medium
///
/// Both fields are required: there is no sensible default cadence or
/// acknowledgement for an unknown device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Delay between polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Acknowledgement payload
    pub acknowledgement: AcknowledgementSetting,
}

/// Acknowledgement as written in the config file
///
/// Either a string (`acknowledgement = "ACK"`, sent as its UTF-8 bytes) or
/// an array of raw byte values (`acknowledgement = [0xFF, 0x00, 0x41]`) for
/// devices whose marker is not text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AcknowledgementSetting {
    Text(String),
    Bytes(Vec<u8>),
}

impl AcknowledgementSetting {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AcknowledgementSetting::Text(text) => text.as_bytes(),
            AcknowledgementSetting::Bytes(bytes) => bytes,
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
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = Self::default_paths();

        for path in &config_paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(ConfigError::NotFound(
            config_paths
                .into_iter()
                .last()
                .unwrap_or_else(|| PathBuf::from("./remotelink.toml")),
        ))
    }

    /// Locations searched by [`Config::load_default`], in order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("remotelink/config.toml")),
            Some(PathBuf::from("./remotelink.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
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

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> ConfigResult<()> {
        if self.link.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "link.poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        let ack = self.link.acknowledgement.as_bytes();
        if ack.is_empty() {
            return Err(ConfigError::Invalid {
                field: "link.acknowledgement",
                reason: "must not be empty".to_string(),
            });
        }
        if ack.len() > self.udp.max_packet_size {
            return Err(ConfigError::Invalid {
                field: "link.acknowledgement",
                reason: format!("longer than udp.max_packet_size ({})", self.udp.max_packet_size),
            });
        }
        if let Ok(frame) = protocol::decode(ack) {
            return Err(ConfigError::Invalid {
                field: "link.acknowledgement",
                reason: format!("decodes as a frame ({:?})", frame),
            });
        }
        Ok(())
    }

    /// Engine settings for [`crate::Connection::open`]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(
            Duration::from_millis(self.link.poll_interval_ms),
            Acknowledgement::from(self.link.acknowledgement.as_bytes().to_vec()),
        )
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        link: LinkConfig {
            poll_interval_ms: 10,
            acknowledgement: AcknowledgementSetting::Text("ACK".to_string()),
        },
        udp: UdpTransportConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 24810)),
            peer: SocketAddr::from(([192, 168, 4, 1], 24810)),
            max_packet_size: 1472,
        },
    };

    Ok(toml::to_string_pretty(&config)?)
}
