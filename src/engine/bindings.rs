//! Live connection-to-participant registry.
//!
//! Tracks which session and participant each live connection currently
//! represents, so the transport-fired disconnect can find the affected
//! roster entry. Entries are written on create, accept, and rejoin, and
//! removed when the connection goes away.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::session::{ConnectionId, ParticipantId, SessionId};

/// What a live connection currently represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
}

/// Shared registry of live bindings, one entry per bound connection.
#[derive(Default)]
pub struct ConnectionBindings {
    bindings: RwLock<HashMap<ConnectionId, Binding>>,
}

impl ConnectionBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) {
        self.bindings.write().await.insert(
            connection_id,
            Binding {
                session_id,
                participant_id,
            },
        );
    }

    pub async fn lookup(&self, connection_id: &ConnectionId) -> Option<Binding> {
        self.bindings.read().await.get(connection_id).cloned()
    }

    /// Remove and return the binding for a closed connection.
    pub async fn unbind(&self, connection_id: &ConnectionId) -> Option<Binding> {
        self.bindings.write().await.remove(connection_id)
    }
}
