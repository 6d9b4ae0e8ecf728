//! WebSocket front for the session protocol engine.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `WS /ws` - Protocol connection; one engine per socket
//!
//! Each upgraded socket is registered with the shared fabric, receives
//! a `welcome` event carrying its connection id, and then exchanges
//! protocol events as JSON text frames. Closing the socket fires the
//! engine's disconnect handling.

pub mod router;
pub mod websocket;

pub use router::{create_router, serve, AppState, ServerConfig};
pub use websocket::ws_handler;
