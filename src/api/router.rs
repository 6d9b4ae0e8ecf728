//! Router configuration and server startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::websocket::ws_handler;
use crate::engine::EngineContext;
use crate::fabric::ChannelFabric;
use crate::session::{MemoryStore, SessionStore, DEFAULT_SESSION_TTL};

/// Shared state handed to every connection handler.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<EngineContext>,
    pub fabric: Arc<ChannelFabric>,
}

impl AppState {
    /// State backed by the in-memory store with the default TTL.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), DEFAULT_SESSION_TTL)
    }

    /// State over a caller-supplied store, e.g. an external cache.
    pub fn with_store(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        let fabric = Arc::new(ChannelFabric::new());
        let ctx = Arc::new(EngineContext::with_ttl(store, fabric.clone(), ttl));
        Self { ctx, fabric }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Create the router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", any(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Start the server.
pub async fn serve(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();
    let router = create_router(state);

    tracing::info!("Starting remote-state server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(crate::error::RemoteStateError::Io)?;

    axum::serve(listener, router)
        .await
        .map_err(|e| crate::error::RemoteStateError::Io(std::io::Error::other(e.to_string())))?;

    Ok(())
}
