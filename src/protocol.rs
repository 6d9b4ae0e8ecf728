//! Wire protocol events.
//!
//! All payloads are JSON objects tagged by `type`. Field names follow
//! the wire convention of the session record (`sessionId`,
//! `participantId`). Action and custom payloads are opaque JSON values
//! passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{ConnectionId, Game, ParticipantId, SessionId};

/// Verbs a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Open a new session with the caller as host.
    Create,
    /// Ask to join an existing session; queued until the host decides.
    #[serde(rename_all = "camelCase")]
    Join { session_id: SessionId },
    /// Reclaim a previously accepted identity from a new connection.
    #[serde(rename_all = "camelCase")]
    Rejoin {
        session_id: SessionId,
        participant_id: ParticipantId,
        /// The connection id that was bound when the identity was
        /// cached; must match the stored binding.
        prior_connection_id: ConnectionId,
    },
    /// Host approves a pending participant.
    #[serde(rename_all = "camelCase")]
    Accept {
        session_id: SessionId,
        participant_id: ParticipantId,
    },
    /// Host rejects a pending participant.
    #[serde(rename_all = "camelCase")]
    Decline {
        session_id: SessionId,
        participant_id: ParticipantId,
    },
    /// Guest proposes an action; forwarded to the host only.
    #[serde(rename_all = "camelCase")]
    Notify { session_id: SessionId, action: Value },
    /// Host publishes a new authoritative snapshot.
    #[serde(rename_all = "camelCase")]
    Update { session_id: SessionId, game: Game },
}

/// Events the engine sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First event on any connection: the transport-issued id, needed
    /// by clients to key their rejoin identity cache.
    #[serde(rename_all = "camelCase")]
    Welcome { connection_id: ConnectionId },
    /// Private identity grant after create, join, or rejoin.
    #[serde(rename_all = "camelCase")]
    Assign {
        participant_id: ParticipantId,
        session_id: SessionId,
    },
    /// Snapshot broadcast after any accepted mutation.
    Update { game: Game },
    /// Join request routed to the host connection.
    #[serde(rename = "join", rename_all = "camelCase")]
    JoinRequest { participant_id: ParticipantId },
    /// Action forwarded to the host connection.
    #[serde(rename_all = "camelCase")]
    Notify {
        action: Value,
        participant_id: ParticipantId,
    },
    /// Private rejection notice to a declined joiner.
    #[serde(rename = "decline")]
    Declined,
    /// Private error report for the triggering request only.
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Build an error event from a protocol error.
    pub fn error(err: &crate::error::RemoteStateError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
