// Handshake signatures
// Each side proves possession of its pairing keypair by signing the raw
// shared-key bytes; the remote checks that proof against the public key it
// received out of band.

use crate::identity::{Keypair, PublicKey, SharedKey};
use ed25519_dalek::{Signature as DalekSignature, Signer as DalekSigner, Verifier};
use thiserror::Error;

/// Length of an Ed25519 signature on the wire
pub const SIGNATURE_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Invalid signature length: expected 64, got {0}")]
    InvalidLength(usize),
}

/// Ed25519 signature (64 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: DalekSignature,
    bytes: [u8; SIGNATURE_LEN],
}

impl Signature {
    /// Get the raw bytes of the signature
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Create a signature from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let bytes: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidLength(bytes.len()))?;

        let inner = DalekSignature::from_bytes(&bytes);
        Ok(Self { inner, bytes })
    }

    fn from_inner(inner: DalekSignature) -> Self {
        let bytes = inner.to_bytes();
        Self { inner, bytes }
    }
}

/// Signing and verification operations
pub struct Signer;

impl Signer {
    /// Sign a message with a keypair
    pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
        Signature::from_inner(keypair.signing_key().sign(message))
    }

    /// Verify a signature against a public key and message
    pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        public_key.inner().verify(message, &signature.inner).is_ok()
    }

    /// The handshake proof: our signature over the shared key
    pub fn sign_shared_key(keypair: &Keypair, shared: &SharedKey) -> Signature {
        Self::sign(keypair, shared.as_bytes())
    }

    /// Check the remote's handshake proof
    pub fn verify_shared_key(
        remote: &PublicKey,
        shared: &SharedKey,
        signature: &Signature,
    ) -> bool {
        Self::verify(remote, shared.as_bytes(), signature)
    }
}
