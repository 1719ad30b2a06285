// Events surfaced to the surrounding system, and the secondary-transport handoff

use crate::handshake::RejectReason;
use crate::session::SessionRole;
use crate::storage::Peer;
use crate::transport::TransportError;
use tokio::sync::mpsc;
use tracing::info;

/// Discrete outcomes other components (UI, retry policy) react to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// First contact with an address; a Peer record was created
    PeerLearned { address: String },
    /// Handshake ended Trusted
    Authenticated { address: String, role: SessionRole },
    /// Handshake ended Rejected; may call for re-pairing
    Rejected { address: String, reason: RejectReason },
    /// A transport operation failed; the session (if any) was ended
    TransportFailed {
        address: Option<String>,
        error: TransportError,
    },
    /// A session ended for any reason
    SessionClosed { address: String },
    /// A feed record was created or its details changed
    FeedUpdated { key: String, from: String },
    /// The remote finished declaring and every inquiry to it was answered
    PhaseOneComplete { address: String },
}

/// Cloneable handle for emitting `LinkEvent`s. Emitting never blocks and
/// never fails; events are dropped if nobody listens.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl EventSink {
    /// Sink plus the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: LinkEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

// ============================================================================
// SECONDARY TRANSPORT HANDOFF
// ============================================================================

/// Role this device takes on the secondary transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecondaryRole {
    Initiator,
    Responder,
}

/// Signal handed to the secondary transport once a session is Trusted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handoff {
    pub role: SecondaryRole,
    /// Stream-transport address of the authenticated peer
    pub peer_address: String,
    /// Where to connect on the secondary transport, if the peer shared it
    pub target_address: Option<String>,
}

impl Handoff {
    /// The accepting side tells the remote to initiate, so it responds
    /// itself; the connecting side initiates.
    pub fn for_session(role: SessionRole, peer: &Peer) -> Self {
        let role = match role {
            SessionRole::Acceptor => SecondaryRole::Responder,
            SessionRole::Connector => SecondaryRole::Initiator,
        };
        Self {
            role,
            peer_address: peer.address().to_string(),
            target_address: peer.secondary_address().map(str::to_string),
        }
    }
}

/// Receives the "proceed" signal for the secondary transport
pub trait HandoffSink: Send + Sync {
    fn begin_secondary(&self, handoff: Handoff);
}

/// Handoff sink that only logs; for deployments without a secondary link
#[derive(Debug, Default)]
pub struct LogHandoff;

impl HandoffSink for LogHandoff {
    fn begin_secondary(&self, handoff: Handoff) {
        info!(
            peer = %handoff.peer_address,
            role = ?handoff.role,
            target = handoff.target_address.as_deref().unwrap_or("-"),
            "secondary transport may proceed"
        );
    }
}
