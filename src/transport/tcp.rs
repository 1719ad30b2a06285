// TCP Transport Implementation
// Stream transport over TCP/IP, the portable stand-in for a serial RFCOMM link

use crate::transport::{
    Listener, StreamTransport, TransportConfig, TransportError, TransportSession,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

// ============================================================================
// TCP TRANSPORT CONFIG
// ============================================================================

/// Configuration for TCP transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpTransportConfig {
    /// Base transport configuration
    pub base: TransportConfig,
    /// Address to bind to
    pub bind_address: String,
    /// Port to bind to (0 for random)
    pub bind_port: u16,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            base: TransportConfig::default(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 0,
            nodelay: true,
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_config(mut self, base: TransportConfig) -> Self {
        self.base = base;
        self
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.bind_address.is_empty() {
            return Err(TransportError::InvalidConfig("bind_address cannot be empty".to_string()));
        }
        self.base.validate()
    }
}

// ============================================================================
// TCP TRANSPORT
// ============================================================================

/// TCP transport implementation
#[derive(Debug, Clone)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }
}

#[async_trait]
impl StreamTransport for TcpTransport {
    async fn listen(&self) -> Result<Box<dyn Listener>, TransportError> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.bind_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        let local_address = listener
            .local_addr()
            .map_err(|e| TransportError::BindFailed(e.to_string()))?
            .to_string();

        info!(address = %local_address, "tcp listener bound");

        Ok(Box::new(TcpSessionListener {
            listener,
            local_address,
            nodelay: self.config.nodelay,
        }))
    }

    async fn connect(&self, remote_address: &str) -> Result<TransportSession, TransportError> {
        if remote_address.is_empty() {
            return Err(TransportError::InvalidAddress("empty address".to_string()));
        }

        let stream = timeout(
            self.config.base.connection_timeout(),
            TcpStream::connect(remote_address),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        stream.set_nodelay(self.config.nodelay).ok();
        let peer = peer_identity(&stream, remote_address);
        debug!(remote = %remote_address, peer = %peer, "tcp connection established");

        Ok(TransportSession::new(stream, peer))
    }
}

/// Peers are identified by IP alone: the accepting side only ever sees an
/// ephemeral source port, so both ends must agree on the bare address.
fn peer_identity(stream: &TcpStream, fallback: &str) -> String {
    stream
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| fallback.to_string())
}

struct TcpSessionListener {
    listener: TcpListener,
    local_address: String,
    nodelay: bool,
}

#[async_trait]
impl Listener for TcpSessionListener {
    async fn accept(&mut self) -> Result<TransportSession, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        stream.set_nodelay(self.nodelay).ok();
        debug!(remote = %addr, "tcp connection accepted");

        Ok(TransportSession::new(stream, addr.ip().to_string()))
    }

    fn local_address(&self) -> String {
        self.local_address.clone()
    }
}
