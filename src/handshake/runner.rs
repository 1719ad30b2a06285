// Handshake runner
//
// Both ends run the same sequence: sign the shared key, send the signature,
// verify the remote's signature against the stored remote public key, answer
// "VS" or "VNS", then wait for the remote's verdict. Trust is mutual only
// once both verdicts are "VS".

use crate::events::{EventSink, LinkEvent};
use crate::handshake::message::HandshakeMessage;
use crate::handshake::{
    HandshakeConfig, HandshakeFraming, HandshakeState, RejectReason, Verdict,
};
use crate::identity::{KeyMaterialSource, Signer};
use crate::storage::{Peer, Store, StoreError};
use crate::transport::{TransportError, TransportSession};
use crate::wire::{read_frame, write_frame};
use tracing::{debug, info, warn};

enum Failure {
    Rejected(RejectReason),
    Transport(TransportError),
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        Failure::Transport(err)
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        Failure::Rejected(RejectReason::Store(err.to_string()))
    }
}

/// One handshake over one session
pub struct Handshake<'a> {
    session: &'a TransportSession,
    store: &'a dyn Store,
    keys: &'a dyn KeyMaterialSource,
    events: &'a EventSink,
    config: &'a HandshakeConfig,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    pub fn new(
        session: &'a TransportSession,
        store: &'a dyn Store,
        keys: &'a dyn KeyMaterialSource,
        events: &'a EventSink,
        config: &'a HandshakeConfig,
    ) -> Self {
        Self {
            session,
            store,
            keys,
            events,
            config,
            state: HandshakeState::Start,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Drive the handshake to a verdict. The session is closed unless the
    /// verdict is `Proceed`.
    pub async fn run(mut self) -> Verdict {
        let verdict = match self.drive().await {
            Ok(peer) => {
                self.transition(HandshakeState::Trusted);
                info!(peer = %peer.address(), "handshake trusted");
                Verdict::Proceed(peer)
            }
            Err(Failure::Rejected(reason)) => {
                self.transition(HandshakeState::Rejected);
                warn!(remote = %self.session.remote_address(), %reason, "handshake rejected");
                Verdict::Rejected(reason)
            }
            Err(Failure::Transport(err)) => {
                self.transition(HandshakeState::Rejected);
                warn!(
                    remote = %self.session.remote_address(),
                    error = %err,
                    "handshake transport failure"
                );
                Verdict::TransportError(err)
            }
        };

        if !verdict.is_trusted() {
            self.session.close();
        }
        verdict
    }

    async fn drive(&mut self) -> Result<Peer, Failure> {
        let peer = self.resolve_peer()?;

        let signature = Signer::sign_shared_key(peer.local_keypair(), peer.shared_key());
        self.transition(HandshakeState::AwaitLocalSignatureSent);
        self.send(&HandshakeMessage::Signature(signature)).await?;
        self.transition(HandshakeState::AwaitRemoteSignature);

        loop {
            let bytes = self.receive().await?;
            let message = HandshakeMessage::from_bytes(&bytes)
                .map_err(|e| Failure::Rejected(RejectReason::Malformed(e.to_string())))?;

            match (self.state, message) {
                (HandshakeState::AwaitRemoteSignature, HandshakeMessage::Signature(sig)) => {
                    self.transition(HandshakeState::Verifying);
                    let remote_key = peer.remote_public_key();
                    if !Signer::verify_shared_key(remote_key, peer.shared_key(), &sig) {
                        // Best effort: the rejection stands even if the remote is gone.
                        if let Err(e) = self.send(&HandshakeMessage::NotVerified).await {
                            debug!(error = %e, "could not deliver VNS");
                        }
                        return Err(Failure::Rejected(RejectReason::SignatureInvalid));
                    }
                    if let Err(e) = self.send(&HandshakeMessage::Verified).await {
                        return Err(self.remote_verdict_after(e).await);
                    }
                    self.transition(HandshakeState::AwaitRemoteVerdict);
                }
                (HandshakeState::AwaitRemoteVerdict, HandshakeMessage::Verified) => {
                    return Ok(peer);
                }
                (_, HandshakeMessage::NotVerified) => {
                    return Err(Failure::Rejected(RejectReason::RemoteRejected));
                }
                (HandshakeState::AwaitRemoteSignature, HandshakeMessage::Verified) => {
                    return Err(Failure::Rejected(RejectReason::Malformed(
                        "verdict before signature".to_string(),
                    )));
                }
                (_, HandshakeMessage::Signature(_)) => {
                    return Err(Failure::Rejected(RejectReason::Malformed(
                        "duplicate signature".to_string(),
                    )));
                }
                (state, message) => {
                    return Err(Failure::Rejected(RejectReason::Malformed(format!(
                        "{:?} in state {:?}",
                        message, state
                    ))));
                }
            }
        }
    }

    /// Find the Peer for the remote address, creating it from a key bundle
    /// on first contact. Losing an insert race to a concurrent session means
    /// the other session's record wins.
    fn resolve_peer(&self) -> Result<Peer, Failure> {
        let address = self.session.remote_address();
        if let Some(peer) = self.store.get_peer(address)? {
            return Ok(peer);
        }

        let bundle = self
            .keys
            .take_bundle(address)
            .ok_or(Failure::Rejected(RejectReason::UnknownPeer))?;
        let peer = Peer::from_bundle(address, bundle);

        match self.store.insert_peer(&peer) {
            Ok(()) => {
                info!(
                    peer = %address,
                    key = %peer.remote_public_key().fingerprint(),
                    "learned new peer"
                );
                self.events.emit(LinkEvent::PeerLearned {
                    address: address.to_string(),
                });
                Ok(peer)
            }
            Err(StoreError::PeerExists(_)) => {
                debug!(peer = %address, "peer inserted concurrently, using stored record");
                self.store
                    .get_peer(address)?
                    .ok_or(Failure::Rejected(RejectReason::UnknownPeer))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Our "VS" could not be sent. A remote that rejected us has already
    /// written "VNS" and closed, so a buffered verdict wins over the write
    /// error.
    async fn remote_verdict_after(&self, send_error: TransportError) -> Failure {
        match self.receive().await.map(|b| HandshakeMessage::from_bytes(&b)) {
            Ok(Ok(HandshakeMessage::NotVerified)) => {
                Failure::Rejected(RejectReason::RemoteRejected)
            }
            _ => Failure::Transport(send_error),
        }
    }

    fn transition(&mut self, next: HandshakeState) {
        debug!(
            remote = %self.session.remote_address(),
            from = ?self.state,
            to = ?next,
            "handshake"
        );
        self.state = next;
    }

    async fn send(&self, message: &HandshakeMessage) -> Result<(), TransportError> {
        let bytes = message.to_bytes();
        match self.config.framing {
            HandshakeFraming::LengthPrefixed => write_frame(self.session, &bytes).await,
            HandshakeFraming::Legacy => self.session.write(&bytes).await,
        }
    }

    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        match self.config.framing {
            HandshakeFraming::LengthPrefixed => {
                read_frame(self.session, self.config.max_message_len).await
            }
            HandshakeFraming::Legacy => {
                let mut buf = vec![0u8; self.config.legacy_buffer_size];
                let n = self.session.read(&mut buf).await?;
                buf.truncate(n);
                Ok(buf)
            }
        }
    }
}
