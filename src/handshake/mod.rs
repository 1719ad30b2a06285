// Handshake module - mutual authentication over a fresh session
// Signed shared key exchange with explicit "VS"/"VNS" verdicts

mod message;
mod runner;
mod state;

pub use message::{HandshakeMessage, MessageError, NOT_VERIFIED, VERIFIED};
pub use runner::Handshake;
pub use state::{HandshakeConfig, HandshakeFraming, HandshakeState, RejectReason, Verdict};
