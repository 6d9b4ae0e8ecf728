//! Session protocol engine.
//!
//! One [`Engine`] value exists per live connection; everything else is
//! shared through the [`EngineContext`]. Each verb handler validates
//! its preconditions against a freshly loaded session record, persists
//! once on success, and emits its outbound events. No handler writes
//! the record on an error path, and every error is reported privately
//! to the calling connection only.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RemoteStateError;
use crate::fabric::Fabric;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::session::{
    ConnectionId, Game, ParticipantId, SessionId, SessionRecord, SessionStore,
    DEFAULT_SESSION_TTL,
};
use crate::Result;

mod bindings;
mod locks;

pub use bindings::{Binding, ConnectionBindings};
pub use locks::SessionLocks;

/// State shared by every connection's engine: the store and fabric
/// seams, the live connection bindings, and the per-session write
/// locks.
pub struct EngineContext {
    store: Arc<dyn SessionStore>,
    fabric: Arc<dyn Fabric>,
    bindings: ConnectionBindings,
    locks: SessionLocks,
    ttl: Duration,
}

impl EngineContext {
    pub fn new(store: Arc<dyn SessionStore>, fabric: Arc<dyn Fabric>) -> Self {
        Self::with_ttl(store, fabric, DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(store: Arc<dyn SessionStore>, fabric: Arc<dyn Fabric>, ttl: Duration) -> Self {
        Self {
            store,
            fabric,
            bindings: ConnectionBindings::new(),
            locks: SessionLocks::new(),
            ttl,
        }
    }

    async fn load_record(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let blob = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| RemoteStateError::UnknownSession(session_id.to_string()))?;
        Ok(serde_json::from_str(&blob)?)
    }

    async fn save_record(&self, record: &SessionRecord) -> Result<()> {
        let blob = serde_json::to_string(record)?;
        self.store.set(&record.game.id, blob, self.ttl).await
    }
}

/// The broadcast group for a session is named by its id.
fn group(session_id: &SessionId) -> &str {
    session_id.as_str()
}

/// Per-connection protocol handler.
pub struct Engine {
    connection_id: ConnectionId,
    ctx: Arc<EngineContext>,
}

impl Engine {
    pub fn new(ctx: Arc<EngineContext>, connection_id: ConnectionId) -> Self {
        Self { connection_id, ctx }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Dispatch one inbound verb.
    ///
    /// Errors are reported to the caller as a private `error` event and
    /// returned; they never reach other group members and never tear
    /// down the connection.
    pub async fn handle(&self, event: ClientEvent) -> Result<()> {
        let result = match event {
            ClientEvent::Create => self.create().await,
            ClientEvent::Join { session_id } => self.join(session_id).await,
            ClientEvent::Rejoin {
                session_id,
                participant_id,
                prior_connection_id,
            } => {
                self.rejoin(session_id, participant_id, prior_connection_id)
                    .await
            }
            ClientEvent::Accept {
                session_id,
                participant_id,
            } => self.accept(session_id, participant_id).await,
            ClientEvent::Decline {
                session_id,
                participant_id,
            } => self.decline(session_id, participant_id).await,
            ClientEvent::Notify { session_id, action } => self.notify(session_id, action).await,
            ClientEvent::Update { session_id, game } => self.update(session_id, game).await,
        };

        if let Err(ref err) = result {
            warn!(connection = %self.connection_id, error = %err, "verb rejected");
            let _ = self
                .ctx
                .fabric
                .send_to_connection(&self.connection_id, ServerEvent::error(err))
                .await;
        }

        result
    }

    /// Open a new session with the caller as its connected host.
    async fn create(&self) -> Result<()> {
        let (record, participant_id) = SessionRecord::create(self.connection_id.clone());
        let session_id = record.game.id.clone();

        let _guard = self.ctx.locks.acquire(&session_id).await;
        self.ctx.save_record(&record).await?;

        self.ctx
            .bindings
            .bind(
                self.connection_id.clone(),
                session_id.clone(),
                participant_id.clone(),
            )
            .await;
        self.ctx
            .fabric
            .join_group(&self.connection_id, group(&session_id))
            .await?;

        self.ctx
            .fabric
            .send_to_connection(
                &self.connection_id,
                ServerEvent::Assign {
                    participant_id: participant_id.clone(),
                    session_id: session_id.clone(),
                },
            )
            .await?;
        self.ctx
            .fabric
            .send_to_connection(&self.connection_id, ServerEvent::Update { game: record.game })
            .await?;

        info!(session = %session_id, host = %participant_id, "session created");
        Ok(())
    }

    /// Queue the caller for host approval and notify the host.
    async fn join(&self, session_id: SessionId) -> Result<()> {
        let _guard = self.ctx.locks.acquire(&session_id).await;
        let mut record = self.ctx.load_record(&session_id).await?;

        let host_connection = record.host_connection()?.clone();
        let participant_id = ParticipantId::generate();
        record
            .pending_players_queue
            .insert(participant_id.clone(), self.connection_id.clone());
        self.ctx.save_record(&record).await?;

        self.ctx
            .fabric
            .send_to_connection(
                &host_connection,
                ServerEvent::JoinRequest {
                    participant_id: participant_id.clone(),
                },
            )
            .await?;
        self.ctx
            .fabric
            .send_to_connection(
                &self.connection_id,
                ServerEvent::Assign {
                    participant_id: participant_id.clone(),
                    session_id: session_id.clone(),
                },
            )
            .await?;

        debug!(session = %session_id, participant = %participant_id, "join queued");
        Ok(())
    }

    /// Rebind a previously accepted participant to the calling
    /// connection, keyed by the connection id it last held.
    async fn rejoin(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        prior_connection_id: ConnectionId,
    ) -> Result<()> {
        let _guard = self.ctx.locks.acquire(&session_id).await;
        let mut record = self.ctx.load_record(&session_id).await?;

        if record.game.player(&participant_id).is_none() {
            return Err(RemoteStateError::UnknownParticipant(
                participant_id.to_string(),
            ));
        }
        let stored = record
            .player_connection_ids
            .get(&participant_id)
            .ok_or_else(|| RemoteStateError::UnknownParticipant(participant_id.to_string()))?;
        if stored != &prior_connection_id {
            return Err(RemoteStateError::IdentityMismatch(
                participant_id.to_string(),
            ));
        }

        record.rebind(&participant_id, self.connection_id.clone());
        self.ctx.save_record(&record).await?;

        self.ctx
            .bindings
            .bind(
                self.connection_id.clone(),
                session_id.clone(),
                participant_id.clone(),
            )
            .await;
        self.ctx
            .fabric
            .join_group(&self.connection_id, group(&session_id))
            .await?;

        self.ctx
            .fabric
            .send_to_group(group(&session_id), ServerEvent::Update { game: record.game })
            .await?;
        self.ctx
            .fabric
            .send_to_connection(
                &self.connection_id,
                ServerEvent::Assign {
                    participant_id: participant_id.clone(),
                    session_id: session_id.clone(),
                },
            )
            .await?;

        info!(session = %session_id, participant = %participant_id, "participant rejoined");
        Ok(())
    }

    /// Host-only: ratify a pending participant into the roster.
    async fn accept(&self, session_id: SessionId, participant_id: ParticipantId) -> Result<()> {
        let _guard = self.ctx.locks.acquire(&session_id).await;
        let mut record = self.ctx.load_record(&session_id).await?;

        self.require_host(&record)?;
        let guest_connection = record.ratify(&participant_id)?;
        self.ctx.save_record(&record).await?;

        self.ctx
            .bindings
            .bind(
                guest_connection.clone(),
                session_id.clone(),
                participant_id.clone(),
            )
            .await;
        self.ctx
            .fabric
            .join_group(&guest_connection, group(&session_id))
            .await?;
        self.ctx
            .fabric
            .send_to_group(group(&session_id), ServerEvent::Update { game: record.game })
            .await?;

        info!(session = %session_id, participant = %participant_id, "participant accepted");
        Ok(())
    }

    /// Host-only: reject a pending participant.
    async fn decline(&self, session_id: SessionId, participant_id: ParticipantId) -> Result<()> {
        let _guard = self.ctx.locks.acquire(&session_id).await;
        let mut record = self.ctx.load_record(&session_id).await?;

        self.require_host(&record)?;
        let queued_connection = record
            .pending_players_queue
            .remove(&participant_id)
            .ok_or_else(|| {
                RemoteStateError::UnknownPendingParticipant(participant_id.to_string())
            })?;
        self.ctx.save_record(&record).await?;

        self.ctx
            .fabric
            .send_to_connection(&queued_connection, ServerEvent::Declined)
            .await?;

        debug!(session = %session_id, participant = %participant_id, "participant declined");
        Ok(())
    }

    /// Forward a guest-proposed action to the host connection only.
    async fn notify(&self, session_id: SessionId, action: Value) -> Result<()> {
        let record = self.ctx.load_record(&session_id).await?;

        let participant_id = record
            .participant_for_connection(&self.connection_id)
            .ok_or_else(|| {
                RemoteStateError::UnknownParticipant(self.connection_id.to_string())
            })?
            .clone();
        let host_connection = record.host_connection()?.clone();

        self.ctx
            .fabric
            .send_to_connection(
                &host_connection,
                ServerEvent::Notify {
                    action,
                    participant_id,
                },
            )
            .await?;
        Ok(())
    }

    /// Host-only: overwrite the snapshot wholesale and broadcast it.
    async fn update(&self, session_id: SessionId, game: Game) -> Result<()> {
        let _guard = self.ctx.locks.acquire(&session_id).await;
        let mut record = self.ctx.load_record(&session_id).await?;

        self.require_host(&record)?;
        if game.id != session_id {
            return Err(RemoteStateError::Validation(format!(
                "snapshot id {} does not match session {}",
                game.id, session_id
            )));
        }

        record.game = game;
        self.ctx.save_record(&record).await?;

        self.ctx
            .fabric
            .send_to_group(group(&session_id), ServerEvent::Update { game: record.game })
            .await?;
        Ok(())
    }

    /// Transport-fired: mark the bound participant disconnected.
    ///
    /// The stale connection binding is deliberately left in the record;
    /// a later rejoin proves identity against it.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(binding) = self.ctx.bindings.unbind(&self.connection_id).await else {
            return Ok(());
        };

        let _guard = self.ctx.locks.acquire(&binding.session_id).await;
        let mut record = match self.ctx.load_record(&binding.session_id).await {
            Ok(record) => record,
            // Session already expired; nothing to update.
            Err(RemoteStateError::UnknownSession(_)) => return Ok(()),
            Err(err) => return Err(err),
        };

        record.mark_disconnected(&binding.participant_id);
        self.ctx.save_record(&record).await?;

        self.ctx
            .fabric
            .send_to_group(
                group(&binding.session_id),
                ServerEvent::Update { game: record.game },
            )
            .await?;

        info!(
            session = %binding.session_id,
            participant = %binding.participant_id,
            "participant disconnected"
        );
        Ok(())
    }

    /// Authority check for host-only verbs: the caller's connection
    /// must be the host's current binding. Participant identity is not
    /// consulted, since a connection id survives within one connection
    /// but not across reconnects.
    fn require_host(&self, record: &SessionRecord) -> Result<()> {
        let host_connection = record.host_connection()?;
        if host_connection != &self.connection_id {
            return Err(RemoteStateError::AuthorizationDenied(format!(
                "connection {} is not the session host",
                self.connection_id
            )));
        }
        Ok(())
    }
}
