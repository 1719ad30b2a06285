// Node configuration
//
// One TOML file covers every layer:
//
//     [transport]
//     bind_address = "0.0.0.0"
//     bind_port = 4100
//
//     [transport.base]
//     connection_timeout_secs = 12
//
//     [handshake]
//     framing = "length_prefixed"
//
//     [sync]
//     sync_after_trust = true
//
// Missing sections and fields take their defaults.

use crate::handshake::HandshakeConfig;
use crate::sync::SyncConfig;
use crate::transport::TcpTransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedsyncConfig {
    pub transport: TcpTransportConfig,
    pub handshake: HandshakeConfig,
    pub sync: SyncConfig,
}

impl FeedsyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TcpTransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.handshake.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}
