//! Client transport seam.
//!
//! The driver is transport-agnostic: it sends [`ClientEvent`]s and
//! receives [`ServerEvent`]s through these traits. A [`Connector`]
//! produces a fresh transport for every (re)connection attempt.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{Engine, EngineContext};
use crate::error::RemoteStateError;
use crate::fabric::ChannelFabric;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::Result;

/// One live client connection: ordered, full-duplex event delivery.
///
/// The first received event is always `Welcome`.
#[async_trait]
pub trait ClientTransport: Send {
    async fn send(&mut self, event: ClientEvent) -> Result<()>;

    /// Next inbound event, or `None` once the connection is gone.
    async fn recv(&mut self) -> Option<ServerEvent>;
}

/// Factory for client transports; called again after a disconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ClientTransport>>;
}

/// In-process transport wired straight into an engine, used by tests
/// and same-process embeddings.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

#[async_trait]
impl ClientTransport for ChannelTransport {
    async fn send(&mut self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .map_err(|_| RemoteStateError::ChannelClosed)
    }

    async fn recv(&mut self) -> Option<ServerEvent> {
        self.inbound.recv().await
    }
}

/// Connector that opens [`ChannelTransport`]s against a shared engine
/// context. Each connect registers a fresh fabric connection and spawns
/// the per-connection verb loop, firing `disconnect` when the client
/// side hangs up.
pub struct ChannelConnector {
    ctx: Arc<EngineContext>,
    fabric: Arc<ChannelFabric>,
}

impl ChannelConnector {
    pub fn new(ctx: Arc<EngineContext>, fabric: Arc<ChannelFabric>) -> Self {
        Self { ctx, fabric }
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self) -> Result<Box<dyn ClientTransport>> {
        let (connection_id, inbound) = self.fabric.register().await;
        let engine = Engine::new(self.ctx.clone(), connection_id.clone());
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();

        let fabric = self.fabric.clone();
        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                // Errors are reported to the caller by the engine; the
                // loop itself survives them.
                let _ = engine.handle(event).await;
            }
            let _ = engine.disconnect().await;
            fabric.unregister(&connection_id).await;
        });

        Ok(Box::new(ChannelTransport {
            outbound: outbound_tx,
            inbound,
        }))
    }
}
