//! Session data model and persistence.
//!
//! This module provides the identifier types, the roster model shared
//! with clients, the persisted session record, and the storage seam
//! used by the protocol engine.

mod game;
mod id;
mod store;

pub use game::{Game, Player, SessionRecord};
pub use id::{ConnectionId, ParticipantId, SessionId};
pub use store::{MemoryStore, SessionStore, DEFAULT_SESSION_TTL};
