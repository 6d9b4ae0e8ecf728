//! The shared roster model and the persisted session record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConnectionId, ParticipantId, SessionId};
use crate::error::RemoteStateError;
use crate::Result;

/// One member of a session, host or guest.
///
/// Participants are created on session creation (host) or on accept
/// (guest), and are never removed from the roster, only marked
/// disconnected. `host` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: ParticipantId,
    pub host: bool,
    pub connected: bool,
    /// Opaque per-participant application payload; never inspected by
    /// the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

/// The application-visible snapshot of one session: the fixed id, the
/// roster in join order, and the host-owned application payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: SessionId,
    pub players: Vec<Player>,
    /// Opaque application payload; overwritten wholesale by `update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl Game {
    /// Look up a roster entry by participant id.
    pub fn player(&self, id: &ParticipantId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    fn player_mut(&mut self, id: &ParticipantId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// The roster entry flagged as host, if the record is well formed.
    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.host)
    }
}

/// The persisted unit: the snapshot plus the engine's bookkeeping.
///
/// Serializes to the store value format: `game`, `playerConnectionIds`
/// (participant id -> current connection id, present iff the
/// participant has ever been accepted), and `pendingPlayersQueue`
/// (provisional participant id -> requesting connection id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub game: Game,
    #[serde(rename = "playerConnectionIds")]
    pub player_connection_ids: HashMap<ParticipantId, ConnectionId>,
    #[serde(rename = "pendingPlayersQueue", default)]
    pub pending_players_queue: HashMap<ParticipantId, ConnectionId>,
}

impl SessionRecord {
    /// Create a fresh session with the caller as its connected host.
    ///
    /// Returns the record together with the host's participant id.
    pub fn create(connection_id: ConnectionId) -> (Self, ParticipantId) {
        let session_id = SessionId::generate();
        let participant_id = ParticipantId::generate();

        let record = Self {
            game: Game {
                id: session_id,
                players: vec![Player {
                    id: participant_id.clone(),
                    host: true,
                    connected: true,
                    custom: None,
                }],
                custom: None,
            },
            player_connection_ids: HashMap::from([(participant_id.clone(), connection_id)]),
            pending_players_queue: HashMap::new(),
        };

        (record, participant_id)
    }

    /// The host's current connection binding.
    ///
    /// Fails with `NoHostBound` if the roster has no host or the host
    /// has no stored binding; both imply a corrupted record.
    pub fn host_connection(&self) -> Result<&ConnectionId> {
        let host = self
            .game
            .host()
            .ok_or_else(|| RemoteStateError::NoHostBound(self.game.id.to_string()))?;

        self.player_connection_ids
            .get(&host.id)
            .ok_or_else(|| RemoteStateError::NoHostBound(self.game.id.to_string()))
    }

    /// Resolve the roster participant currently bound to a connection.
    pub fn participant_for_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<&ParticipantId> {
        self.player_connection_ids
            .iter()
            .find(|(_, bound)| *bound == connection_id)
            .map(|(id, _)| id)
    }

    /// Move a pending participant into the roster as a connected guest
    /// and bind its connection. Returns the bound connection id.
    ///
    /// The queue entry is removed, keeping the queue and the bindings
    /// disjoint for any given id.
    pub fn ratify(&mut self, participant_id: &ParticipantId) -> Result<ConnectionId> {
        let connection_id = self
            .pending_players_queue
            .remove(participant_id)
            .ok_or_else(|| {
                RemoteStateError::UnknownPendingParticipant(participant_id.to_string())
            })?;

        self.game.players.push(Player {
            id: participant_id.clone(),
            host: false,
            connected: true,
            custom: None,
        });
        self.player_connection_ids
            .insert(participant_id.clone(), connection_id.clone());

        Ok(connection_id)
    }

    /// Rebind a previously accepted participant to a new connection and
    /// mark it connected.
    pub fn rebind(&mut self, participant_id: &ParticipantId, connection_id: ConnectionId) {
        if let Some(player) = self.game.player_mut(participant_id) {
            player.connected = true;
        }
        self.player_connection_ids
            .insert(participant_id.clone(), connection_id);
    }

    /// Mark a participant disconnected, leaving it in the roster.
    pub fn mark_disconnected(&mut self, participant_id: &ParticipantId) {
        if let Some(player) = self.game.player_mut(participant_id) {
            player.connected = false;
        }
    }
}
