// Handshake states, verdicts and configuration

use crate::storage::Peer;
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How handshake payloads are delimited on the stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeFraming {
    /// Every payload carries a 4-byte little-endian length prefix
    #[default]
    LengthPrefixed,
    /// One unframed buffered read per payload. Interoperates with peers
    /// that do not frame the handshake; coalesced payloads are rejected.
    Legacy,
}

/// Handshake configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    pub framing: HandshakeFraming,
    /// Read buffer for `Legacy` framing
    pub legacy_buffer_size: usize,
    /// Largest accepted framed payload
    pub max_message_len: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            framing: HandshakeFraming::LengthPrefixed,
            legacy_buffer_size: 1024,
            max_message_len: 512,
        }
    }
}

impl HandshakeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_framing(mut self, framing: HandshakeFraming) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_legacy_buffer_size(mut self, size: usize) -> Self {
        self.legacy_buffer_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.legacy_buffer_size < 64 {
            return Err("legacy_buffer_size must hold a 64-byte signature".to_string());
        }
        if self.max_message_len < 64 {
            return Err("max_message_len must hold a 64-byte signature".to_string());
        }
        Ok(())
    }
}

/// Progress of one handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Start,
    AwaitLocalSignatureSent,
    AwaitRemoteSignature,
    Verifying,
    AwaitRemoteVerdict,
    Trusted,
    Rejected,
}

/// Why a handshake ended Rejected
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    #[error("remote signature did not verify")]
    SignatureInvalid,

    #[error("remote refused our signature")]
    RemoteRejected,

    #[error("unexpected handshake payload: {0}")]
    Malformed(String),

    #[error("no key material for this peer")]
    UnknownPeer,

    #[error("peer record unavailable: {0}")]
    Store(String),
}

/// Outcome of a handshake; exactly one is produced per session
#[derive(Clone, Debug)]
pub enum Verdict {
    /// Trusted; application data may flow
    Proceed(Peer),
    Rejected(RejectReason),
    TransportError(TransportError),
}

impl Verdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verdict::Proceed(_))
    }

    /// Terminal state the verdict corresponds to
    pub fn state(&self) -> HandshakeState {
        match self {
            Verdict::Proceed(_) => HandshakeState::Trusted,
            _ => HandshakeState::Rejected,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Proceed(peer) => write!(f, "trusted {}", peer.address()),
            Verdict::Rejected(reason) => write!(f, "rejected: {}", reason),
            Verdict::TransportError(e) => write!(f, "transport error: {}", e),
        }
    }
}
