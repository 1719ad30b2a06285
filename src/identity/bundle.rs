// Out-of-band key bundle
//
// The key material two devices agree on before they ever open a stream.
// The payload is a '#'-separated string:
//
//     secondaryAddress#sharedKey#remotePublicKey#localSecretKey
//
// with every key encoded as URL-safe base64 without padding. It carries the
// receiving device's secret key, so it is provisioning input for that one
// device only.

use crate::identity::{KeyError, Keypair, PublicKey, SharedKey};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::sync::Mutex;
use thiserror::Error;

const SEPARATOR: char = '#';

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Expected 4 '#'-separated fields, got {0}")]
    FieldCount(usize),

    #[error("Invalid base64 in {field}: {reason}")]
    InvalidBase64 { field: &'static str, reason: String },

    #[error("Invalid key in {field}: {source}")]
    InvalidKey {
        field: &'static str,
        #[source]
        source: KeyError,
    },
}

/// One-time key material consumed when a Peer record is first created
#[derive(Clone, Debug)]
pub struct KeyBundle {
    pub shared_key: SharedKey,
    pub local_keypair: Keypair,
    pub remote_public_key: PublicKey,
    /// Address of the remote on the secondary transport, if it was shared
    pub remote_secondary_address: Option<String>,
}

impl KeyBundle {
    /// Generate complementary bundles for two devices that are about to be
    /// introduced. Each side gets the same shared key, its own keypair and
    /// the other side's public key.
    pub fn generate_pair(
        secondary_a: Option<String>,
        secondary_b: Option<String>,
    ) -> (KeyBundle, KeyBundle) {
        let shared_key = SharedKey::generate();
        let keypair_a = Keypair::generate();
        let keypair_b = Keypair::generate();

        let for_a = KeyBundle {
            shared_key: shared_key.clone(),
            remote_public_key: keypair_b.public_key(),
            local_keypair: keypair_a.clone(),
            remote_secondary_address: secondary_b,
        };
        let for_b = KeyBundle {
            shared_key,
            remote_public_key: keypair_a.public_key(),
            local_keypair: keypair_b,
            remote_secondary_address: secondary_a,
        };
        (for_a, for_b)
    }

    /// Encode as an out-of-band payload string.
    ///
    /// The string contains `local_keypair`'s secret key. It is device-local
    /// provisioning material: hand it only to the device that owns this
    /// bundle, and never display it as a QR code or share it with the remote.
    pub fn to_oob(&self) -> String {
        let secondary = self.remote_secondary_address.as_deref().unwrap_or("");
        [
            secondary.to_string(),
            URL_SAFE_NO_PAD.encode(self.shared_key.as_bytes()),
            URL_SAFE_NO_PAD.encode(self.remote_public_key.as_bytes()),
            URL_SAFE_NO_PAD.encode(self.local_keypair.to_bytes()),
        ]
        .join(&SEPARATOR.to_string())
    }

    /// Parse an out-of-band payload string
    pub fn from_oob(payload: &str) -> Result<Self, BundleError> {
        let fields: Vec<&str> = payload.trim().split(SEPARATOR).collect();
        if fields.len() != 4 {
            return Err(BundleError::FieldCount(fields.len()));
        }

        let shared = decode_field("sharedKey", fields[1])?;
        let remote = decode_field("remotePublicKey", fields[2])?;
        let local = decode_field("localSecretKey", fields[3])?;

        Ok(Self {
            shared_key: SharedKey::from_bytes(&shared).map_err(|source| {
                BundleError::InvalidKey { field: "sharedKey", source }
            })?,
            remote_public_key: PublicKey::from_bytes(&remote).map_err(|source| {
                BundleError::InvalidKey { field: "remotePublicKey", source }
            })?,
            local_keypair: Keypair::from_bytes(&local).map_err(|source| {
                BundleError::InvalidKey { field: "localSecretKey", source }
            })?,
            remote_secondary_address: match fields[0] {
                "" => None,
                addr => Some(addr.to_string()),
            },
        })
    }
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, BundleError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| BundleError::InvalidBase64 {
            field,
            reason: e.to_string(),
        })
}

// ============================================================================
// KEY MATERIAL SOURCE
// ============================================================================

/// Supplies key material for a remote address seen for the first time
pub trait KeyMaterialSource: Send + Sync {
    /// Hand out the bundle for `remote_address`, if one is available.
    /// A bundle is consumed by the call.
    fn take_bundle(&self, remote_address: &str) -> Option<KeyBundle>;
}

/// Holds the most recently exchanged bundle until the next first contact
/// consumes it.
#[derive(Default)]
pub struct PendingBundle {
    slot: Mutex<Option<KeyBundle>>,
}

impl PendingBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(bundle: KeyBundle) -> Self {
        Self {
            slot: Mutex::new(Some(bundle)),
        }
    }

    /// Replace the pending bundle (a new out-of-band exchange happened)
    pub fn set(&self, bundle: KeyBundle) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(bundle);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl KeyMaterialSource for PendingBundle {
    fn take_bundle(&self, _remote_address: &str) -> Option<KeyBundle> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}
