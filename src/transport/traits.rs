// Transport Traits and Core Types
// Defines the stream transport abstraction shared by the TCP and in-memory links

use crate::transport::TransportSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// TRANSPORT CONFIG
// ============================================================================

/// Base configuration for all transport types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Outbound connection timeout in seconds
    pub connection_timeout_secs: u32,
    /// Largest length-prefixed frame accepted from a remote
    pub max_frame_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 12,
            max_frame_len: 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection_timeout(mut self, secs: u32) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs as u64)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.connection_timeout_secs == 0 {
            return Err(TransportError::InvalidConfig(
                "connection_timeout_secs cannot be 0".to_string(),
            ));
        }
        if self.max_frame_len == 0 {
            return Err(TransportError::InvalidConfig("max_frame_len cannot be 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// CONNECTION ID
// ============================================================================

/// Unique identifier for a connection, used to correlate log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// Generate a new unique connection ID
    pub fn generate() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Transport closed")]
    Closed,

    #[error("Remote closed the stream")]
    EndOfStream,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// The stream ended, locally or remotely
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::EndOfStream)
    }
}

// ============================================================================
// TRANSPORT TRAITS
// ============================================================================

/// A byte-stream transport able to accept and open connections
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Start listening for inbound connections
    async fn listen(&self) -> Result<Box<dyn Listener>, TransportError>;

    /// Open an outbound connection, bounded by the configured timeout
    async fn connect(&self, remote_address: &str) -> Result<TransportSession, TransportError>;
}

/// A bound listener handing out connected sessions
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next inbound connection
    async fn accept(&mut self) -> Result<TransportSession, TransportError>;

    /// Address remotes can connect to
    fn local_address(&self) -> String;
}
