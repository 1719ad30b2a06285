// Handshake messages
//
// Three payloads travel during the handshake, told apart by content:
// a raw 64-byte signature, the ASCII verdict "VS" and the ASCII verdict
// "VNS".

use crate::identity::{Signature, SIGNATURE_LEN};
use thiserror::Error;

pub const VERIFIED: &[u8] = b"VS";
pub const NOT_VERIFIED: &[u8] = b"VNS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Unrecognized handshake payload of {0} bytes")]
    Unrecognized(usize),

    #[error("Empty handshake payload")]
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeMessage {
    Signature(Signature),
    Verified,
    NotVerified,
}

impl HandshakeMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            HandshakeMessage::Signature(sig) => sig.as_bytes().to_vec(),
            HandshakeMessage::Verified => VERIFIED.to_vec(),
            HandshakeMessage::NotVerified => NOT_VERIFIED.to_vec(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        match bytes {
            [] => Err(MessageError::Empty),
            VERIFIED => Ok(HandshakeMessage::Verified),
            NOT_VERIFIED => Ok(HandshakeMessage::NotVerified),
            _ if bytes.len() == SIGNATURE_LEN => Signature::from_bytes(bytes)
                .map(HandshakeMessage::Signature)
                .map_err(|_| MessageError::Unrecognized(bytes.len())),
            _ => Err(MessageError::Unrecognized(bytes.len())),
        }
    }
}
