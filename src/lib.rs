//! # remote-state
//!
//! Host-authoritative shared state sessions over WebSocket.
//!
//! Several networked participants share one piece of application state.
//! Exactly one participant - the host - computes authoritative
//! transitions; the others propose actions. The server-side protocol
//! engine admits participants, routes proposed actions to the host,
//! publishes host-approved snapshots to the whole session, and
//! survives disconnect/reconnect without losing or duplicating
//! identity.
//!
//! ## Features
//!
//! - **Session protocol engine**: create/join/rejoin/accept/decline/
//!   notify/update over any transport with per-connection addressing
//! - **Dual-role client driver**: one API for hosts and guests; the
//!   host role is detected structurally from the snapshot
//! - **Reconnection**: identity survives a dropped connection through
//!   a durable client-side cache and the `rejoin` verb
//! - **Pluggable persistence**: session records live in any keyed blob
//!   store with expiry
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use remote_state::client::{ChannelConnector, Driver, DriverConfig};
//! use remote_state::engine::EngineContext;
//! use remote_state::fabric::ChannelFabric;
//! use remote_state::session::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> remote_state::Result<()> {
//!     // In-process server state
//!     let fabric = Arc::new(ChannelFabric::new());
//!     let ctx = Arc::new(EngineContext::new(Arc::new(MemoryStore::new()), fabric.clone()));
//!     let connector = Arc::new(ChannelConnector::new(ctx, fabric));
//!
//!     // Host a new session; actions fold through the reducer
//!     let host = Driver::spawn(
//!         connector,
//!         DriverConfig::create().with_reducer(|mut game, action, _who| {
//!             game.custom = Some(action);
//!             game
//!         }),
//!     );
//!
//!     let mut snapshots = host.watch_game();
//!     snapshots.changed().await.ok();
//!     println!("session: {:?}", host.game().map(|g| g.id));
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod cli;
pub mod engine;
pub mod error;
pub mod fabric;
pub mod logging;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use client::{Driver, DriverConfig, DriverPhase};
pub use config::Config;
pub use engine::{Engine, EngineContext};
pub use error::{RemoteStateError, Result};
pub use fabric::{ChannelFabric, Fabric};
pub use protocol::{ClientEvent, ServerEvent};
pub use session::{
    ConnectionId, Game, MemoryStore, ParticipantId, Player, SessionId, SessionRecord, SessionStore,
};
