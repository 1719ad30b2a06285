// Session worker - one connected transport from handshake to close
//
// handshake -> handoff signal -> phase-one declarations -> envelope loop.
// Envelopes are dispatched in arrival order before the next read. A frame
// that does not decode is skipped; a transport or store error ends the
// session.

use crate::events::{Handoff, LinkEvent};
use crate::handshake::{Handshake, RejectReason, Verdict};
use crate::session::{SessionContext, SessionRole};
use crate::storage::Peer;
use crate::sync::SyncError;
use crate::transport::{TransportError, TransportSession};
use crate::wire::{read_frame, write_frame, Envelope};
use tracing::{debug, info, warn};

/// How a session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Trusted, then ended by the remote or after the handoff
    Completed,
    /// Closed locally (superseded or stopped)
    Cancelled,
    Rejected(RejectReason),
    TransportFailed(TransportError),
    /// Trusted, then the feed store failed under the sync engine
    SyncFailed(String),
}

/// Why the envelope exchange stopped
enum ExchangeEnd {
    Transport(TransportError),
    Sync(SyncError),
}

impl From<TransportError> for ExchangeEnd {
    fn from(err: TransportError) -> Self {
        ExchangeEnd::Transport(err)
    }
}

impl From<SyncError> for ExchangeEnd {
    fn from(err: SyncError) -> Self {
        ExchangeEnd::Sync(err)
    }
}

/// Run one session to completion. The session is closed on return and
/// exactly one `SessionClosed` is emitted.
pub async fn run_session(
    ctx: &SessionContext,
    session: &TransportSession,
    role: SessionRole,
) -> SessionEnd {
    let address = session.remote_address().to_string();
    debug!(remote = %address, ?role, id = %session.id(), "session started");

    let verdict = Handshake::new(
        session,
        ctx.store().as_ref(),
        ctx.keys(),
        ctx.events(),
        &ctx.config().handshake,
    )
    .run()
    .await;

    let end = match verdict {
        Verdict::Proceed(peer) => {
            ctx.events().emit(LinkEvent::Authenticated {
                address: address.clone(),
                role,
            });
            ctx.handoff().begin_secondary(Handoff::for_session(role, &peer));

            if ctx.config().sync.sync_after_trust {
                let result = exchange(ctx, session, &peer).await;
                ctx.engine().forget_peer(peer.address());
                match result {
                    Ok(()) | Err(ExchangeEnd::Transport(TransportError::EndOfStream)) => {
                        SessionEnd::Completed
                    }
                    Err(ExchangeEnd::Transport(e)) => transport_ended(ctx, session, e),
                    Err(ExchangeEnd::Sync(e)) => {
                        warn!(remote = %address, error = %e, "feed sync failed");
                        SessionEnd::SyncFailed(e.to_string())
                    }
                }
            } else {
                SessionEnd::Completed
            }
        }
        Verdict::Rejected(reason) => {
            ctx.events().emit(LinkEvent::Rejected {
                address: address.clone(),
                reason: reason.clone(),
            });
            SessionEnd::Rejected(reason)
        }
        Verdict::TransportError(e) => transport_ended(ctx, session, e),
    };

    session.close();
    info!(
        remote = %address,
        sent = session.bytes_sent(),
        received = session.bytes_received(),
        outcome = ?end,
        "session closed"
    );
    ctx.events().emit(LinkEvent::SessionClosed { address });
    end
}

fn transport_ended(
    ctx: &SessionContext,
    session: &TransportSession,
    error: TransportError,
) -> SessionEnd {
    if error == TransportError::Closed && session.is_closed() {
        return SessionEnd::Cancelled;
    }
    ctx.events().emit(LinkEvent::TransportFailed {
        address: Some(session.remote_address().to_string()),
        error: error.clone(),
    });
    SessionEnd::TransportFailed(error)
}

/// Phase one followed by the envelope loop. Only returns on a transport or
/// store error; the remote hanging up is `EndOfStream`.
async fn exchange(
    ctx: &SessionContext,
    session: &TransportSession,
    peer: &Peer,
) -> Result<(), ExchangeEnd> {
    let engine = ctx.engine();
    let address = peer.address();
    let max_frame_len = ctx.config().transport.base.max_frame_len;

    let declarations = engine.begin_phase_one(address)?;
    send_all(session, &declarations).await?;
    engine.declarations_sent(address)?;

    loop {
        let frame = read_frame(session, max_frame_len).await?;
        let envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(peer = %address, error = %e, "skipping envelope");
                continue;
            }
        };
        debug!(peer = %address, method = %envelope.method(), "envelope received");

        let replies = engine.handle(address, envelope)?;
        send_all(session, &replies).await?;
    }
}

async fn send_all(
    session: &TransportSession,
    envelopes: &[Envelope],
) -> Result<(), TransportError> {
    for envelope in envelopes {
        match envelope.encode() {
            Ok(bytes) => write_frame(session, &bytes).await?,
            Err(e) => warn!(method = %envelope.method(), error = %e, "cannot encode envelope"),
        }
    }
    Ok(())
}
