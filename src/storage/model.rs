// Records kept by the store: peers we authenticated and feeds we know about

use crate::identity::{KeyBundle, Keypair, PublicKey, SharedKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PEER
// ============================================================================

/// Identity record for a remote device, keyed by its stream-transport address.
/// Key material is fixed when the record is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    address: String,
    name: Option<String>,
    secondary_address: Option<String>,
    shared_key: SharedKey,
    local_keypair: Keypair,
    remote_public_key: PublicKey,
    learned_at: DateTime<Utc>,
}

impl Peer {
    /// Create a peer record from a freshly consumed out-of-band bundle
    pub fn from_bundle(address: &str, bundle: KeyBundle) -> Self {
        Self {
            address: address.to_string(),
            name: None,
            secondary_address: bundle.remote_secondary_address,
            shared_key: bundle.shared_key,
            local_keypair: bundle.local_keypair,
            remote_public_key: bundle.remote_public_key,
            learned_at: Utc::now(),
        }
    }

    /// Attach a human readable device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn secondary_address(&self) -> Option<&str> {
        self.secondary_address.as_deref()
    }

    pub fn shared_key(&self) -> &SharedKey {
        &self.shared_key
    }

    pub fn local_keypair(&self) -> &Keypair {
        &self.local_keypair
    }

    pub fn remote_public_key(&self) -> &PublicKey {
        &self.remote_public_key
    }

    pub fn learned_at(&self) -> DateTime<Utc> {
        self.learned_at
    }
}

// ============================================================================
// FEED
// ============================================================================

/// Transport kind a feed is served over
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedType {
    Tcp,
    Udp,
    Http,
    Mqtt,
    /// Sent by a newer peer; kept so the feed is still recorded
    #[serde(other)]
    Unknown,
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Http => "HTTP",
            Self::Mqtt => "MQTT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            "HTTP" => Ok(Self::Http),
            "MQTT" => Ok(Self::Mqtt),
            other => Err(format!("unknown feed type '{}'", other)),
        }
    }
}

/// Metadata about a data feed. Type, host and port stay empty until some
/// peer answers an inquiry for the key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub key: String,
    pub feed_type: Option<FeedType>,
    pub host: Option<String>,
    pub port: Option<String>,
    /// Local interest only; never taken from a remote
    pub subscribed: bool,
}

impl Feed {
    /// A feed we only know the key of
    pub fn known(key: &str) -> Self {
        Self {
            key: key.to_string(),
            feed_type: None,
            host: None,
            port: None,
            subscribed: false,
        }
    }

    /// A fully described feed
    pub fn resolved(key: &str, feed_type: FeedType, host: &str, port: &str) -> Self {
        Self {
            key: key.to_string(),
            feed_type: Some(feed_type),
            host: Some(host.to_string()),
            port: Some(port.to_string()),
            subscribed: false,
        }
    }

    pub fn with_subscribed(mut self, subscribed: bool) -> Self {
        self.subscribed = subscribed;
        self
    }

    /// Whether type, host and port are all known
    pub fn is_resolved(&self) -> bool {
        self.feed_type.is_some() && self.host.is_some() && self.port.is_some()
    }

    /// Copy connection details from `other`, keeping our own subscription
    pub fn merge_details(&mut self, other: &Feed) {
        self.feed_type = other.feed_type;
        self.host = other.host.clone();
        self.port = other.port.clone();
    }
}
