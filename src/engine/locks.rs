//! Per-session write serialization.
//!
//! The session record is a single versionless blob, so two handlers
//! racing a read-modify-write against the same session would silently
//! drop one mutation. Every mutating verb therefore holds this lock for
//! its session id across the whole load-validate-persist cycle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::session::SessionId;

/// Lazily populated map of session id to its mutation lock.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutation lock for a session, creating it on first
    /// use. Uncontended entries are swept opportunistically so the map
    /// stays bounded by the set of active sessions.
    pub async fn acquire(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
