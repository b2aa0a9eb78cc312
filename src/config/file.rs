//! Config file
//!
//! Optional TOML file with `[server]` and `[upgrade]` sections. Command line
//! flags take precedence over values from the file.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::{OriginPolicy, UpgradePolicy, DEFAULT_WRITE_BUFFER_SIZE};
use crate::server::{ServerConfig, DEFAULT_BIND, DEFAULT_PORT};

/// Errors that can occur while loading the config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Listener settings
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Address to bind to
    pub bind: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
}

/// Handshake settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UpgradeSection {
    /// WebSocket write buffer size in bytes
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,
    /// Origins allowed to upgrade; empty accepts any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_write_buffer_size() -> usize {
    DEFAULT_WRITE_BUFFER_SIZE
}

impl Default for UpgradeSection {
    fn default() -> Self {
        Self {
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            allowed_origins: Vec::new(),
        }
    }
}

/// Root of the config file
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EchoConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub upgrade: UpgradeSection,
}

impl EchoConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command line values over the file values
    pub fn apply_overrides(
        &mut self,
        bind: Option<String>,
        port: Option<u16>,
        allowed_origins: Vec<String>,
    ) {
        if bind.is_some() {
            self.server.bind = bind;
        }
        if port.is_some() {
            self.server.port = port;
        }
        if !allowed_origins.is_empty() {
            self.upgrade.allowed_origins = allowed_origins;
        }
    }

    /// Listener configuration, falling back to the built-in defaults
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(
            self.server
                .bind
                .clone()
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            self.server.port.unwrap_or(DEFAULT_PORT),
        )
    }

    /// Upgrade policy shared by all connections
    pub fn upgrade_policy(&self) -> UpgradePolicy {
        UpgradePolicy::default()
            .with_write_buffer_size(self.upgrade.write_buffer_size)
            .with_origins(OriginPolicy::from_origins(&self.upgrade.allowed_origins))
    }
}
