//! Session persistence seam.
//!
//! The engine treats storage as a keyed blob store with expiry, per the
//! external-cache contract of the original deployment. Records are
//! serialized JSON; the TTL is refreshed on every write and expiry is
//! the only way a session is ever destroyed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::SessionId;
use crate::Result;

/// Default session record lifetime, refreshed on every write.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Keyed blob store with per-entry expiry.
///
/// No transactional guarantees are assumed; the engine serializes
/// read-modify-write cycles per session itself.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the blob for a session id, or `None` if absent or expired.
    async fn get(&self, id: &SessionId) -> Result<Option<String>>;

    /// Write the blob for a session id, resetting its TTL.
    async fn set(&self, id: &SessionId, blob: String, ttl: Duration) -> Result<()>;
}

struct Entry {
    blob: String,
    expires_at: Instant,
}

/// In-memory [`SessionStore`] with lazy expiry.
///
/// Entries are dropped when read after their deadline; there is no
/// background sweeper.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<SessionId, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired but unswept) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &SessionId) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.blob.clone()))
                }
                Some(_) => {}
            }
        }

        // Expired: upgrade to a write lock and sweep the entry.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(id) {
            if entry.expires_at <= Instant::now() {
                entries.remove(id);
            } else {
                return Ok(Some(entry.blob.clone()));
            }
        }
        Ok(None)
    }

    async fn set(&self, id: &SessionId, blob: String, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            id.clone(),
            Entry {
                blob,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
