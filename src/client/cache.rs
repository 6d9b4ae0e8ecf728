//! Durable identity cache used for reconnection.
//!
//! After a successful assign, the driver records its participant id
//! together with the connection id that was live at that moment, keyed
//! by session id. On a later connect to the same session the cached
//! pair drives a `rejoin` instead of a fresh `join`.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::session::{ConnectionId, ParticipantId, SessionId};

/// One cache entry: the identity to reclaim and the connection id that
/// proves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedIdentity {
    pub participant_id: ParticipantId,
    pub connection_id: ConnectionId,
}

/// Caller-supplied durable storage for identities, keyed by session id.
pub trait IdentityCache: Send + Sync {
    fn load(&self, session_id: &SessionId) -> Option<CachedIdentity>;
    fn store(&self, session_id: &SessionId, identity: CachedIdentity);
}

/// Process-local [`IdentityCache`]; survives reconnects, not restarts.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<SessionId, CachedIdentity>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityCache for MemoryCache {
    fn load(&self, session_id: &SessionId) -> Option<CachedIdentity> {
        self.entries
            .lock()
            .expect("identity cache lock poisoned")
            .get(session_id)
            .cloned()
    }

    fn store(&self, session_id: &SessionId, identity: CachedIdentity) {
        self.entries
            .lock()
            .expect("identity cache lock poisoned")
            .insert(session_id.clone(), identity);
    }
}
