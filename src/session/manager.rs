// Session Role Manager
//
// A node is either listening for one inbound session or connecting to one
// remote, never both, and holds at most one Connected session. Every role
// change bumps a generation counter under the same lock that records the
// active session; a connection produced by a superseded generation is
// closed instead of being admitted.

use crate::events::LinkEvent;
use crate::session::worker::run_session;
use crate::session::SessionContext;
use crate::transport::{Listener, StreamTransport, TransportError, TransportSession};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which side opened the session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Acceptor,
    Connector,
}

/// Observable manager state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RolePhase {
    #[default]
    Idle,
    Listening,
    Connecting,
    Connected,
    Closed,
}

struct Active {
    session: Arc<TransportSession>,
    role: SessionRole,
}

#[derive(Default)]
struct RoleState {
    generation: u64,
    /// Idle, Listening, Connecting or Closed; Connected is derived from `active`
    mode: RolePhase,
    cancel: Option<watch::Sender<bool>>,
    listener_task: Option<JoinHandle<()>>,
    active: Option<Active>,
}

impl RoleState {
    /// End the current role and its session; returns the new generation
    fn end_current(&mut self) -> u64 {
        self.generation += 1;
        if let Some(cancel) = self.cancel.take() {
            cancel.send_replace(true);
        }
        if let Some(active) = self.active.take() {
            debug!(
                remote = %active.session.remote_address(),
                role = ?active.role,
                "closing superseded session"
            );
            active.session.close();
        }
        self.generation
    }

    /// Supersede the current role with a fresh one
    fn supersede(&mut self, mode: RolePhase) -> (u64, watch::Receiver<bool>) {
        let generation = self.end_current();
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(tx);
        self.mode = mode;
        (generation, rx)
    }
}

struct ManagerInner {
    transport: Arc<dyn StreamTransport>,
    ctx: Arc<SessionContext>,
    state: Mutex<RoleState>,
}

impl ManagerInner {
    fn state(&self) -> MutexGuard<'_, RoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `session` as the single active session
    fn claim(&self, generation: u64, session: &Arc<TransportSession>, role: SessionRole) -> bool {
        let mut state = self.state();
        if state.generation != generation || state.active.is_some() {
            return false;
        }
        state.active = Some(Active {
            session: session.clone(),
            role,
        });
        true
    }

    fn release(&self, session: &Arc<TransportSession>) {
        let mut state = self.state();
        if state
            .active
            .as_ref()
            .is_some_and(|a| Arc::ptr_eq(&a.session, session))
        {
            state.active = None;
        }
    }

    /// The role task for `generation` finished on its own
    fn role_ended(&self, generation: u64) {
        let mut state = self.state();
        if state.generation == generation {
            state.mode = RolePhase::Idle;
            state.cancel = None;
        }
    }

    async fn run(&self, session: Arc<TransportSession>, role: SessionRole) {
        run_session(&self.ctx, &session, role).await;
        self.release(&session);
    }
}

async fn cancelled(mut cancel: watch::Receiver<bool>) {
    // A dropped sender also means the role is gone
    let _ = cancel.wait_for(|stop| *stop).await;
}

async fn accept_loop(
    inner: Arc<ManagerInner>,
    mut listener: Box<dyn Listener>,
    generation: u64,
    cancel: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancelled(cancel.clone()) => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(session) => {
                let session = Arc::new(session);
                if !inner.claim(generation, &session, SessionRole::Acceptor) {
                    debug!(
                        remote = %session.remote_address(),
                        "session already active, refusing connection"
                    );
                    session.close();
                    continue;
                }
                let worker = inner.clone();
                tokio::spawn(async move {
                    worker.run(session, SessionRole::Acceptor).await;
                });
            }
            Err(e) if e.is_closed() => break,
            Err(e) => {
                warn!(error = %e, "accept failed");
                inner.ctx.events().emit(LinkEvent::TransportFailed {
                    address: None,
                    error: e,
                });
                break;
            }
        }
    }

    inner.role_ended(generation);
    debug!(address = %listener.local_address(), "listener stopped");
}

/// Owns the listen/connect role of one node
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn StreamTransport>, ctx: SessionContext) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                ctx: Arc::new(ctx),
                state: Mutex::new(RoleState::default()),
            }),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.inner.ctx
    }

    pub fn phase(&self) -> RolePhase {
        let state = self.inner.state();
        if state.active.is_some() {
            RolePhase::Connected
        } else {
            state.mode
        }
    }

    /// Remote address of the Connected session, if any
    pub fn active_peer(&self) -> Option<String> {
        let state = self.inner.state();
        state
            .active
            .as_ref()
            .map(|a| a.session.remote_address().to_string())
    }

    /// Supersede any current role and accept inbound sessions. Returns the
    /// local address once the listener is bound.
    pub async fn start_listening(&self) -> Result<String, TransportError> {
        let (generation, cancel, previous) = {
            let mut state = self.inner.state();
            let (generation, cancel) = state.supersede(RolePhase::Listening);
            (generation, cancel, state.listener_task.take())
        };

        // The old listener must release its address before we bind again
        if let Some(task) = previous {
            let _ = task.await;
        }

        let listener = match self.inner.transport.listen().await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(error = %e, "cannot listen");
                self.inner.role_ended(generation);
                self.inner.ctx.events().emit(LinkEvent::TransportFailed {
                    address: None,
                    error: e.clone(),
                });
                return Err(e);
            }
        };

        let address = listener.local_address();
        info!(%address, "listening");
        let task = tokio::spawn(accept_loop(self.inner.clone(), listener, generation, cancel));

        let mut state = self.inner.state();
        if state.generation == generation {
            state.listener_task = Some(task);
        }
        Ok(address)
    }

    /// Supersede any current role and attempt one connection to `address`.
    /// Must be called within a Tokio runtime.
    pub fn start_connecting(&self, address: &str) {
        let (generation, cancel) = self.inner.state().supersede(RolePhase::Connecting);
        let inner = self.inner.clone();
        let address = address.to_string();
        info!(%address, "connecting");

        tokio::spawn(async move {
            let connected = tokio::select! {
                biased;
                _ = cancelled(cancel) => {
                    debug!(%address, "connect attempt superseded");
                    return;
                }
                connected = inner.transport.connect(&address) => connected,
            };

            match connected {
                Ok(session) => {
                    let session = Arc::new(session);
                    if inner.claim(generation, &session, SessionRole::Connector) {
                        inner.run(session, SessionRole::Connector).await;
                    } else {
                        debug!(%address, "connected after being superseded, closing");
                        session.close();
                    }
                }
                Err(e) => {
                    warn!(%address, error = %e, "connect failed");
                    inner.ctx.events().emit(LinkEvent::TransportFailed {
                        address: Some(address.clone()),
                        error: e,
                    });
                }
            }
            inner.role_ended(generation);
        });
    }

    /// Close the listener, any pending connect and the active session.
    /// Idempotent.
    pub fn stop(&self) {
        let mut state = self.inner.state();
        if state.mode == RolePhase::Closed && state.active.is_none() {
            return;
        }
        // The listener task is kept so a later start_listening waits for it
        state.end_current();
        state.mode = RolePhase::Closed;
        info!("session manager stopped");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
