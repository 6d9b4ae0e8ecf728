//! Dual-role client driver.
//!
//! One driver represents one application participant. It performs the
//! handshake (create, join, or rejoin, chosen from the target session
//! and the identity cache), mirrors the latest snapshot, and forwards
//! local actions. When it discovers it is the host it additionally
//! answers join requests with the admission predicate and folds
//! forwarded actions through the reducer, republishing the result.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::{CachedIdentity, IdentityCache, MemoryCache};
use super::transport::{ClientTransport, Connector};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::session::{Game, ParticipantId, SessionId};

/// Where the driver currently stands in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverPhase {
    /// No handshake sent yet.
    #[default]
    Unbound,
    /// Handshake sent; waiting for the first snapshot (or a decline).
    AwaitingApproval,
    /// Assigned and receiving snapshots.
    Bound,
    /// The host declined the join. Permanent.
    Declined,
    /// The connection dropped; a rejoin will be attempted.
    Disconnected,
}

impl DriverPhase {
    /// Check if a transition to the target phase is valid.
    ///
    /// `Declined` is absorbing; `Disconnected` returns through the
    /// rejoin handshake (`AwaitingApproval`).
    pub fn can_transition_to(&self, target: DriverPhase) -> bool {
        use DriverPhase::*;
        matches!(
            (*self, target),
            (Unbound, AwaitingApproval)
                | (AwaitingApproval, Bound)
                | (AwaitingApproval, Declined)
                | (AwaitingApproval, Disconnected)
                | (Bound, Bound)
                | (Bound, Disconnected)
                | (Disconnected, AwaitingApproval)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DriverPhase::Declined)
    }
}

/// Structural role detection: a participant is host iff its id matches
/// the roster entry flagged `host` in the latest snapshot.
pub fn is_host(participant_id: Option<&ParticipantId>, game: Option<&Game>) -> bool {
    match (participant_id, game) {
        (Some(id), Some(game)) => game.host().map(|h| &h.id == id).unwrap_or(false),
        _ => false,
    }
}

/// Host-side state transition: `(snapshot, action, proposer) -> snapshot`.
pub type Reducer = dyn Fn(Game, Value, &ParticipantId) -> Game + Send + Sync;

/// Host-side admission check evaluated against the current snapshot.
pub type AdmissionPredicate = dyn Fn(&Game) -> bool + Send + Sync;

/// Driver configuration.
pub struct DriverConfig {
    /// Session to join; `None` creates a new session with this driver
    /// as host.
    pub session_id: Option<SessionId>,
    /// Durable identity storage driving rejoin.
    pub cache: Arc<dyn IdentityCache>,
    /// Applied to forwarded actions when this driver is host.
    pub reducer: Arc<Reducer>,
    /// Decides pending joins when this driver is host.
    pub admission: Arc<AdmissionPredicate>,
    /// Pause between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl DriverConfig {
    /// Create a new session as host.
    pub fn create() -> Self {
        Self::target(None)
    }

    /// Join (or rejoin) an existing session.
    pub fn join(session_id: SessionId) -> Self {
        Self::target(Some(session_id))
    }

    fn target(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            cache: Arc::new(MemoryCache::new()),
            reducer: Arc::new(|game, _action, _participant| game),
            admission: Arc::new(|_game| true),
            reconnect_delay: Duration::from_millis(500),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn IdentityCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_reducer<F>(mut self, reducer: F) -> Self
    where
        F: Fn(Game, Value, &ParticipantId) -> Game + Send + Sync + 'static,
    {
        self.reducer = Arc::new(reducer);
        self
    }

    pub fn with_admission<F>(mut self, admission: F) -> Self
    where
        F: Fn(&Game) -> bool + Send + Sync + 'static,
    {
        self.admission = Arc::new(admission);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Handle to a running driver. Dropping it tears the connection down.
pub struct Driver {
    game_rx: watch::Receiver<Option<Game>>,
    phase_rx: watch::Receiver<DriverPhase>,
    participant_rx: watch::Receiver<Option<ParticipantId>>,
    intent_tx: mpsc::UnboundedSender<Value>,
    task: JoinHandle<()>,
}

impl Driver {
    /// Spawn the driver's event loop on the current runtime.
    pub fn spawn(connector: Arc<dyn Connector>, config: DriverConfig) -> Self {
        let (game_tx, game_rx) = watch::channel(None);
        let (phase_tx, phase_rx) = watch::channel(DriverPhase::Unbound);
        let (participant_tx, participant_rx) = watch::channel(None);
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(
            connector,
            config,
            game_tx,
            phase_tx,
            participant_tx,
            intent_rx,
        ));

        Self {
            game_rx,
            phase_rx,
            participant_rx,
            intent_tx,
            task,
        }
    }

    /// Latest snapshot, if any has arrived.
    pub fn game(&self) -> Option<Game> {
        self.game_rx.borrow().clone()
    }

    /// Watch channel over the snapshot, for awaiting changes.
    pub fn watch_game(&self) -> watch::Receiver<Option<Game>> {
        self.game_rx.clone()
    }

    pub fn phase(&self) -> DriverPhase {
        *self.phase_rx.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<DriverPhase> {
        self.phase_rx.clone()
    }

    /// Permanently true once the host has declined this participant.
    pub fn declined(&self) -> bool {
        self.phase() == DriverPhase::Declined
    }

    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.participant_rx.borrow().clone()
    }

    /// Whether this driver currently holds the host role.
    pub fn is_host(&self) -> bool {
        is_host(
            self.participant_rx.borrow().as_ref(),
            self.game_rx.borrow().as_ref(),
        )
    }

    /// Propose an action to the host. A no-op before a session is
    /// bound.
    pub fn dispatch(&self, action: Value) {
        let _ = self.intent_tx.send(action);
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Everything the event loop threads through its handlers.
struct LoopState {
    config: DriverConfig,
    session_id: Option<SessionId>,
    participant_id: Option<ParticipantId>,
    snapshot: Option<Game>,
    phase: DriverPhase,
    game_tx: watch::Sender<Option<Game>>,
    phase_tx: watch::Sender<DriverPhase>,
    participant_tx: watch::Sender<Option<ParticipantId>>,
}

impl LoopState {
    fn set_phase(&mut self, target: DriverPhase) {
        if self.phase.can_transition_to(target) {
            self.phase = target;
            let _ = self.phase_tx.send(target);
        } else if self.phase != target {
            debug!(from = ?self.phase, to = ?target, "phase transition skipped");
        }
    }

    fn is_host(&self) -> bool {
        is_host(self.participant_id.as_ref(), self.snapshot.as_ref())
    }
}

async fn run(
    connector: Arc<dyn Connector>,
    config: DriverConfig,
    game_tx: watch::Sender<Option<Game>>,
    phase_tx: watch::Sender<DriverPhase>,
    participant_tx: watch::Sender<Option<ParticipantId>>,
    mut intent_rx: mpsc::UnboundedReceiver<Value>,
) {
    let mut state = LoopState {
        session_id: config.session_id.clone(),
        config,
        participant_id: None,
        snapshot: None,
        phase: DriverPhase::Unbound,
        game_tx,
        phase_tx,
        participant_tx,
    };

    loop {
        let mut transport = match connector.connect().await {
            Ok(transport) => transport,
            Err(err) => {
                warn!(error = %err, "connect failed, retrying");
                tokio::time::sleep(state.config.reconnect_delay).await;
                continue;
            }
        };

        // The transport front always announces the connection id first.
        let connection_id = match transport.recv().await {
            Some(ServerEvent::Welcome { connection_id }) => connection_id,
            Some(other) => {
                warn!(event = ?other, "expected welcome, reconnecting");
                tokio::time::sleep(state.config.reconnect_delay).await;
                continue;
            }
            None => {
                tokio::time::sleep(state.config.reconnect_delay).await;
                continue;
            }
        };

        let handshake = match &state.session_id {
            None => ClientEvent::Create,
            Some(session_id) => match state.config.cache.load(session_id) {
                Some(identity) => ClientEvent::Rejoin {
                    session_id: session_id.clone(),
                    participant_id: identity.participant_id,
                    prior_connection_id: identity.connection_id,
                },
                None => ClientEvent::Join {
                    session_id: session_id.clone(),
                },
            },
        };
        if transport.send(handshake).await.is_err() {
            tokio::time::sleep(state.config.reconnect_delay).await;
            continue;
        }
        state.set_phase(DriverPhase::AwaitingApproval);

        let lost = pump(&mut state, transport.as_mut(), &connection_id, &mut intent_rx).await;
        if !lost {
            // Intent channel closed: the driver handle is gone.
            return;
        }
        if state.phase.is_terminal() {
            return;
        }
        state.set_phase(DriverPhase::Disconnected);
        tokio::time::sleep(state.config.reconnect_delay).await;
    }
}

/// Inner event loop for one connection. Returns `true` if the transport
/// was lost (reconnect), `false` if the driver handle was dropped.
async fn pump(
    state: &mut LoopState,
    transport: &mut dyn ClientTransport,
    connection_id: &crate::session::ConnectionId,
    intent_rx: &mut mpsc::UnboundedReceiver<Value>,
) -> bool {
    loop {
        tokio::select! {
            intent = intent_rx.recv() => {
                let Some(action) = intent else {
                    return false;
                };
                // Dispatch is a no-op before a session is bound.
                if state.phase == DriverPhase::Bound {
                    if let Some(session_id) = &state.session_id {
                        let event = ClientEvent::Notify {
                            session_id: session_id.clone(),
                            action,
                        };
                        if transport.send(event).await.is_err() {
                            return true;
                        }
                    }
                }
            }
            event = transport.recv() => {
                let Some(event) = event else {
                    return true;
                };
                if !apply(state, transport, connection_id, event).await {
                    return true;
                }
            }
        }
    }
}

/// Apply one server event. Returns `false` if the transport failed
/// while responding.
async fn apply(
    state: &mut LoopState,
    transport: &mut dyn ClientTransport,
    connection_id: &crate::session::ConnectionId,
    event: ServerEvent,
) -> bool {
    match event {
        ServerEvent::Assign {
            participant_id,
            session_id,
        } => {
            state.participant_id = Some(participant_id.clone());
            let _ = state.participant_tx.send(Some(participant_id.clone()));
            state.config.cache.store(
                &session_id,
                CachedIdentity {
                    participant_id,
                    connection_id: connection_id.clone(),
                },
            );
            state.session_id = Some(session_id);
        }
        ServerEvent::Update { game } => {
            state.snapshot = Some(game.clone());
            let _ = state.game_tx.send(Some(game));
            state.set_phase(DriverPhase::Bound);
        }
        ServerEvent::JoinRequest { participant_id } => {
            if !state.is_host() {
                return true;
            }
            let (Some(game), Some(session_id)) = (&state.snapshot, &state.session_id) else {
                debug!("join request before first snapshot, leaving pending");
                return true;
            };
            let event = if (state.config.admission)(game) {
                ClientEvent::Accept {
                    session_id: session_id.clone(),
                    participant_id,
                }
            } else {
                ClientEvent::Decline {
                    session_id: session_id.clone(),
                    participant_id,
                }
            };
            if transport.send(event).await.is_err() {
                return false;
            }
        }
        ServerEvent::Notify {
            action,
            participant_id,
        } => {
            if !state.is_host() {
                return true;
            }
            let (Some(game), Some(session_id)) = (&state.snapshot, &state.session_id) else {
                return true;
            };
            let next = (state.config.reducer)(game.clone(), action, &participant_id);
            let event = ClientEvent::Update {
                session_id: session_id.clone(),
                game: next,
            };
            if transport.send(event).await.is_err() {
                return false;
            }
        }
        ServerEvent::Declined => {
            state.set_phase(DriverPhase::Declined);
        }
        ServerEvent::Welcome { .. } => {
            debug!("unexpected mid-stream welcome ignored");
        }
        ServerEvent::Error { code, message } => {
            warn!(code, message, "server reported error");
        }
    }
    true
}
