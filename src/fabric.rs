//! Broadcast fabric seam.
//!
//! The engine addresses peers only through this trait: a connection can
//! be added to a named group, and events can be sent to one connection
//! or to a whole group. The channel-backed implementation serves both
//! the in-process tests and the WebSocket front, which pumps each
//! connection's mailbox out to its socket.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::protocol::ServerEvent;
use crate::session::ConnectionId;
use crate::Result;

/// Transport-side primitives consumed by the engine.
///
/// Sends are best-effort: events for connections that have gone away
/// are dropped, mirroring the delivery guarantees of the underlying
/// transport.
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Add a connection to a named broadcast group.
    async fn join_group(&self, connection_id: &ConnectionId, group: &str) -> Result<()>;

    /// Send an event to every current member of a group.
    async fn send_to_group(&self, group: &str, event: ServerEvent) -> Result<()>;

    /// Send an event to a single connection.
    async fn send_to_connection(&self, connection_id: &ConnectionId, event: ServerEvent)
        -> Result<()>;
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

/// In-process [`Fabric`] backed by per-connection unbounded channels.
#[derive(Default)]
pub struct ChannelFabric {
    registry: RwLock<Registry>,
}

impl ChannelFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its id and mailbox.
    ///
    /// A `Welcome` event carrying the issued id is queued first, so the
    /// client learns its connection id before anything else.
    pub async fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let connection_id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();

        let _ = tx.send(ServerEvent::Welcome {
            connection_id: connection_id.clone(),
        });

        let mut registry = self.registry.write().await;
        registry.connections.insert(connection_id.clone(), tx);

        (connection_id, rx)
    }

    /// Drop a connection's mailbox and group memberships.
    pub async fn unregister(&self, connection_id: &ConnectionId) {
        let mut registry = self.registry.write().await;
        registry.connections.remove(connection_id);
        for members in registry.groups.values_mut() {
            members.remove(connection_id);
        }
    }

    /// Number of live registered connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }
}

#[async_trait]
impl Fabric for ChannelFabric {
    async fn join_group(&self, connection_id: &ConnectionId, group: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        registry
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(connection_id.clone());
        Ok(())
    }

    async fn send_to_group(&self, group: &str, event: ServerEvent) -> Result<()> {
        let registry = self.registry.read().await;
        let Some(members) = registry.groups.get(group) else {
            trace!(group, "broadcast to unknown group dropped");
            return Ok(());
        };

        for member in members {
            if let Some(tx) = registry.connections.get(member) {
                let _ = tx.send(event.clone());
            }
        }
        Ok(())
    }

    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        event: ServerEvent,
    ) -> Result<()> {
        let registry = self.registry.read().await;
        match registry.connections.get(connection_id) {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => trace!(%connection_id, "send to vanished connection dropped"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_sends_welcome() {
        let fabric = ChannelFabric::new();
        let (id, mut rx) = fabric.register().await;

        match rx.recv().await.unwrap() {
            ServerEvent::Welcome { connection_id } => assert_eq!(connection_id, id),
            other => panic!("expected welcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_to_connection() {
        let fabric = ChannelFabric::new();
        let (id, mut rx) = fabric.register().await;
        rx.recv().await.unwrap(); // welcome

        fabric
            .send_to_connection(&id, ServerEvent::Declined)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), ServerEvent::Declined);
    }

    #[tokio::test]
    async fn test_group_broadcast_reaches_members_only() {
        let fabric = ChannelFabric::new();
        let (a, mut rx_a) = fabric.register().await;
        let (b, mut rx_b) = fabric.register().await;
        let (_c, mut rx_c) = fabric.register().await;
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();
        rx_c.recv().await.unwrap();

        fabric.join_group(&a, "g1").await.unwrap();
        fabric.join_group(&b, "g1").await.unwrap();

        fabric
            .send_to_group("g1", ServerEvent::Declined)
            .await
            .unwrap();

        assert_eq!(rx_a.recv().await.unwrap(), ServerEvent::Declined);
        assert_eq!(rx_b.recv().await.unwrap(), ServerEvent::Declined);
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_vanished_connection_is_silent() {
        let fabric = ChannelFabric::new();
        let (id, _rx) = fabric.register().await;
        fabric.unregister(&id).await;

        // Delivery is best-effort; no error surfaces
        fabric
            .send_to_connection(&id, ServerEvent::Declined)
            .await
            .unwrap();
        assert_eq!(fabric.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_leaves_group() {
        let fabric = ChannelFabric::new();
        let (a, mut rx_a) = fabric.register().await;
        let (b, _rx_b) = fabric.register().await;
        rx_a.recv().await.unwrap();

        fabric.join_group(&a, "g1").await.unwrap();
        fabric.join_group(&b, "g1").await.unwrap();
        fabric.unregister(&b).await;

        fabric
            .send_to_group("g1", ServerEvent::Declined)
            .await
            .unwrap();
        assert_eq!(rx_a.recv().await.unwrap(), ServerEvent::Declined);
    }
}
