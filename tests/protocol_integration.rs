//! Protocol engine integration tests.
//!
//! These drive the engine over the in-process fabric and memory store,
//! one engine per simulated connection, and assert both on the events
//! each connection observes and on the persisted record.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use remote_state::engine::{Engine, EngineContext};
use remote_state::fabric::ChannelFabric;
use remote_state::session::{
    ConnectionId, Game, MemoryStore, ParticipantId, SessionId, SessionRecord, SessionStore,
};
use remote_state::{ClientEvent, RemoteStateError, ServerEvent};

// ============================================================
// Harness
// ============================================================

struct Server {
    store: Arc<MemoryStore>,
    fabric: Arc<ChannelFabric>,
    ctx: Arc<EngineContext>,
}

impl Server {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let fabric = Arc::new(ChannelFabric::new());
        let ctx = Arc::new(EngineContext::new(store.clone(), fabric.clone()));
        Self { store, fabric, ctx }
    }

    /// Register a connection and skip its welcome event.
    async fn connect(&self) -> (Engine, UnboundedReceiver<ServerEvent>) {
        let (connection_id, mut rx) = self.fabric.register().await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerEvent::Welcome { .. }
        ));
        (Engine::new(self.ctx.clone(), connection_id), rx)
    }

    /// Read the persisted record straight from the store.
    async fn record(&self, session_id: &SessionId) -> SessionRecord {
        let blob = self
            .store
            .get(session_id)
            .await
            .unwrap()
            .expect("session must exist");
        serde_json::from_str(&blob).unwrap()
    }

    async fn snapshot(&self, session_id: &SessionId) -> Game {
        self.record(session_id).await.game
    }
}

async fn recv_assign(rx: &mut UnboundedReceiver<ServerEvent>) -> (ParticipantId, SessionId) {
    match rx.recv().await.unwrap() {
        ServerEvent::Assign {
            participant_id,
            session_id,
        } => (participant_id, session_id),
        other => panic!("expected assign, got {:?}", other),
    }
}

async fn recv_update(rx: &mut UnboundedReceiver<ServerEvent>) -> Game {
    match rx.recv().await.unwrap() {
        ServerEvent::Update { game } => game,
        other => panic!("expected update, got {:?}", other),
    }
}

async fn recv_join_request(rx: &mut UnboundedReceiver<ServerEvent>) -> ParticipantId {
    match rx.recv().await.unwrap() {
        ServerEvent::JoinRequest { participant_id } => participant_id,
        other => panic!("expected join request, got {:?}", other),
    }
}

/// Stand up a session with one accepted guest and drain every mailbox.
async fn session_with_guest(
    server: &Server,
) -> (
    SessionId,
    Engine,
    UnboundedReceiver<ServerEvent>,
    Engine,
    UnboundedReceiver<ServerEvent>,
    ParticipantId,
) {
    let (host, mut host_rx) = server.connect().await;
    let (guest, mut guest_rx) = server.connect().await;

    host.handle(ClientEvent::Create).await.unwrap();
    let (_, session_id) = recv_assign(&mut host_rx).await;
    recv_update(&mut host_rx).await;

    guest
        .handle(ClientEvent::Join {
            session_id: session_id.clone(),
        })
        .await
        .unwrap();
    let guest_id = recv_join_request(&mut host_rx).await;
    recv_assign(&mut guest_rx).await;

    host.handle(ClientEvent::Accept {
        session_id: session_id.clone(),
        participant_id: guest_id.clone(),
    })
    .await
    .unwrap();
    recv_update(&mut host_rx).await;
    recv_update(&mut guest_rx).await;

    (session_id, host, host_rx, guest, guest_rx, guest_id)
}

// ============================================================
// Admission flow
// ============================================================

#[tokio::test]
async fn create_assigns_identity_and_snapshot() {
    let server = Server::new();
    let (host, mut host_rx) = server.connect().await;

    host.handle(ClientEvent::Create).await.unwrap();

    let (participant_id, session_id) = recv_assign(&mut host_rx).await;
    let game = recv_update(&mut host_rx).await;

    assert_eq!(game.id, session_id);
    assert_eq!(game.players.len(), 1);
    assert_eq!(game.players[0].id, participant_id);
    assert!(game.players[0].host);
    assert!(game.players[0].connected);
}

#[tokio::test]
async fn join_routes_to_host_and_assigns_requester() {
    let server = Server::new();
    let (host, mut host_rx) = server.connect().await;
    let (guest, mut guest_rx) = server.connect().await;

    host.handle(ClientEvent::Create).await.unwrap();
    let (host_id, session_id) = recv_assign(&mut host_rx).await;
    recv_update(&mut host_rx).await;

    guest
        .handle(ClientEvent::Join {
            session_id: session_id.clone(),
        })
        .await
        .unwrap();

    let pending_id = recv_join_request(&mut host_rx).await;
    assert_ne!(pending_id, host_id);

    let (assigned_id, assigned_session) = recv_assign(&mut guest_rx).await;
    assert_eq!(assigned_id, pending_id);
    assert_eq!(assigned_session, session_id);

    // Queued, not yet in the roster or the broadcast group
    let record = server.record(&session_id).await;
    assert_eq!(record.game.players.len(), 1);
    assert!(record.pending_players_queue.contains_key(&pending_id));
    assert!(guest_rx.try_recv().is_err());
}

#[tokio::test]
async fn accept_yields_one_host_and_two_players() {
    let server = Server::new();
    let (session_id, _host, _host_rx, _guest, mut guest_rx, guest_id) =
        session_with_guest(&server).await;

    let game = server.snapshot(&session_id).await;
    assert_eq!(game.players.len(), 2);
    assert_eq!(game.players.iter().filter(|p| p.host).count(), 1);

    let guest = game.players.iter().find(|p| p.id == guest_id).unwrap();
    assert!(!guest.host);
    assert!(guest.connected);

    // Queue drained
    let record = server.record(&session_id).await;
    assert!(record.pending_players_queue.is_empty());
    assert!(guest_rx.try_recv().is_err());
}

#[tokio::test]
async fn accept_requires_host_connection() {
    let server = Server::new();
    let (host, mut host_rx) = server.connect().await;
    let (guest, mut guest_rx) = server.connect().await;

    host.handle(ClientEvent::Create).await.unwrap();
    let (_, session_id) = recv_assign(&mut host_rx).await;
    recv_update(&mut host_rx).await;

    guest
        .handle(ClientEvent::Join {
            session_id: session_id.clone(),
        })
        .await
        .unwrap();
    let pending_id = recv_join_request(&mut host_rx).await;
    recv_assign(&mut guest_rx).await;

    // The joiner cannot ratify itself
    let err = guest
        .handle(ClientEvent::Accept {
            session_id: session_id.clone(),
            participant_id: pending_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStateError::AuthorizationDenied(_)));

    let record = server.record(&session_id).await;
    assert_eq!(record.game.players.len(), 1);
    assert!(record.pending_players_queue.contains_key(&pending_id));
}

#[tokio::test]
async fn decline_leaves_roster_unchanged() {
    let server = Server::new();
    let (host, mut host_rx) = server.connect().await;
    let (guest, mut guest_rx) = server.connect().await;
    let (_observer, mut observer_rx) = server.connect().await;

    host.handle(ClientEvent::Create).await.unwrap();
    let (_, session_id) = recv_assign(&mut host_rx).await;
    recv_update(&mut host_rx).await;

    guest
        .handle(ClientEvent::Join {
            session_id: session_id.clone(),
        })
        .await
        .unwrap();
    let pending_id = recv_join_request(&mut host_rx).await;
    recv_assign(&mut guest_rx).await;

    host.handle(ClientEvent::Decline {
        session_id: session_id.clone(),
        participant_id: pending_id.clone(),
    })
    .await
    .unwrap();

    // Only the queued connection hears the decline
    assert!(matches!(
        guest_rx.recv().await.unwrap(),
        ServerEvent::Declined
    ));
    assert!(host_rx.try_recv().is_err());
    assert!(observer_rx.try_recv().is_err());

    let record = server.record(&session_id).await;
    assert_eq!(record.game.players.len(), 1);
    assert!(record.pending_players_queue.is_empty());
}

#[tokio::test]
async fn decline_requires_host_connection() {
    let server = Server::new();
    let (host, mut host_rx) = server.connect().await;
    let (guest, mut guest_rx) = server.connect().await;
    let (stranger, _stranger_rx) = server.connect().await;

    host.handle(ClientEvent::Create).await.unwrap();
    let (_, session_id) = recv_assign(&mut host_rx).await;
    recv_update(&mut host_rx).await;

    guest
        .handle(ClientEvent::Join {
            session_id: session_id.clone(),
        })
        .await
        .unwrap();
    let pending_id = recv_join_request(&mut host_rx).await;
    recv_assign(&mut guest_rx).await;

    let err = stranger
        .handle(ClientEvent::Decline {
            session_id: session_id.clone(),
            participant_id: pending_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStateError::AuthorizationDenied(_)));

    // The queued joiner never hears a decline from the stranger
    assert!(guest_rx.try_recv().is_err());
    let record = server.record(&session_id).await;
    assert!(record.pending_players_queue.contains_key(&pending_id));
}

// ============================================================
// Notify and update
// ============================================================

#[tokio::test]
async fn notify_reaches_host_only() {
    let server = Server::new();
    let (session_id, _host, mut host_rx, guest, mut guest_rx, guest_id) =
        session_with_guest(&server).await;

    guest
        .handle(ClientEvent::Notify {
            session_id,
            action: json!({"type": "increment", "by": 2}),
        })
        .await
        .unwrap();

    match host_rx.recv().await.unwrap() {
        ServerEvent::Notify {
            action,
            participant_id,
        } => {
            assert_eq!(action, json!({"type": "increment", "by": 2}));
            assert_eq!(participant_id, guest_id);
        }
        other => panic!("expected notify, got {:?}", other),
    }

    // The proposer itself sees nothing
    assert!(guest_rx.try_recv().is_err());
}

#[tokio::test]
async fn notify_from_unbound_connection_is_rejected() {
    let server = Server::new();
    let (session_id, _host, mut host_rx, _guest, _guest_rx, _guest_id) =
        session_with_guest(&server).await;
    let (stranger, mut stranger_rx) = server.connect().await;

    let err = stranger
        .handle(ClientEvent::Notify {
            session_id,
            action: json!({"type": "foo"}),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStateError::UnknownParticipant(_)));

    // Error goes to the stranger; the host never sees a forward
    match stranger_rx.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "UNKNOWN_PARTICIPANT"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(host_rx.try_recv().is_err());
}

#[tokio::test]
async fn update_broadcasts_to_group() {
    let server = Server::new();
    let (session_id, host, mut host_rx, _guest, mut guest_rx, _guest_id) =
        session_with_guest(&server).await;

    let mut game = server.snapshot(&session_id).await;
    game.custom = Some(json!({"score": 42}));

    host.handle(ClientEvent::Update {
        session_id: session_id.clone(),
        game: game.clone(),
    })
    .await
    .unwrap();

    assert_eq!(recv_update(&mut host_rx).await.custom, game.custom);
    assert_eq!(recv_update(&mut guest_rx).await.custom, game.custom);
    assert_eq!(server.snapshot(&session_id).await.custom, game.custom);
}

#[tokio::test]
async fn update_from_guest_is_denied_and_snapshot_unchanged() {
    let server = Server::new();
    let (session_id, _host, mut host_rx, guest, mut guest_rx, _guest_id) =
        session_with_guest(&server).await;

    let mut forged = server.snapshot(&session_id).await;
    forged.custom = Some(json!({"cheat": true}));

    let err = guest
        .handle(ClientEvent::Update {
            session_id: session_id.clone(),
            game: forged,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStateError::AuthorizationDenied(_)));

    match guest_rx.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "AUTHORIZATION_DENIED"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(host_rx.try_recv().is_err());
    assert_eq!(server.snapshot(&session_id).await.custom, None);
}

// ============================================================
// Disconnect and rejoin
// ============================================================

#[tokio::test]
async fn disconnect_marks_participant_and_broadcasts() {
    let server = Server::new();
    let (session_id, _host, mut host_rx, guest, _guest_rx, guest_id) =
        session_with_guest(&server).await;

    guest.disconnect().await.unwrap();

    let game = recv_update(&mut host_rx).await;
    assert_eq!(game.players.len(), 2);
    let player = game.players.iter().find(|p| p.id == guest_id).unwrap();
    assert!(!player.connected);

    // Stale binding kept for a later rejoin proof
    let record = server.record(&session_id).await;
    assert!(record.player_connection_ids.contains_key(&guest_id));
}

#[tokio::test]
async fn rejoin_restores_identity_without_duplicates() {
    let server = Server::new();
    let (session_id, _host, mut host_rx, guest, _guest_rx, guest_id) =
        session_with_guest(&server).await;
    let prior_connection = guest.connection_id().clone();

    guest.disconnect().await.unwrap();
    recv_update(&mut host_rx).await;

    let (returning, mut returning_rx) = server.connect().await;
    returning
        .handle(ClientEvent::Rejoin {
            session_id: session_id.clone(),
            participant_id: guest_id.clone(),
            prior_connection_id: prior_connection,
        })
        .await
        .unwrap();

    // Group-wide snapshot, then a private assign to the returner
    let game = recv_update(&mut returning_rx).await;
    assert_eq!(game.players.len(), 2);
    assert!(
        game.players
            .iter()
            .find(|p| p.id == guest_id)
            .unwrap()
            .connected
    );

    let (assigned, assigned_session) = recv_assign(&mut returning_rx).await;
    assert_eq!(assigned, guest_id);
    assert_eq!(assigned_session, session_id);

    assert_eq!(recv_update(&mut host_rx).await.players.len(), 2);

    // Binding replaced with the new connection
    let record = server.record(&session_id).await;
    assert_eq!(
        record.player_connection_ids.get(&guest_id),
        Some(returning.connection_id())
    );
}

#[tokio::test]
async fn rejoin_with_wrong_prior_connection_is_rejected() {
    let server = Server::new();
    let (session_id, _host, mut host_rx, guest, _guest_rx, guest_id) =
        session_with_guest(&server).await;

    guest.disconnect().await.unwrap();
    recv_update(&mut host_rx).await;

    let (imposter, mut imposter_rx) = server.connect().await;
    let err = imposter
        .handle(ClientEvent::Rejoin {
            session_id: session_id.clone(),
            participant_id: guest_id.clone(),
            prior_connection_id: ConnectionId::from("not-the-one"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStateError::IdentityMismatch(_)));

    match imposter_rx.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "IDENTITY_MISMATCH"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(host_rx.try_recv().is_err());

    // Roster unchanged, guest still marked disconnected
    let game = server.snapshot(&session_id).await;
    assert_eq!(game.players.len(), 2);
    assert!(
        !game
            .players
            .iter()
            .find(|p| p.id == guest_id)
            .unwrap()
            .connected
    );
}

#[tokio::test]
async fn rejoin_unknown_participant_is_rejected() {
    let server = Server::new();
    let (session_id, _host, _host_rx, _guest, _guest_rx, _guest_id) =
        session_with_guest(&server).await;

    let (stranger, _rx) = server.connect().await;
    let err = stranger
        .handle(ClientEvent::Rejoin {
            session_id,
            participant_id: ParticipantId::from("never-accepted"),
            prior_connection_id: ConnectionId::from("whatever"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStateError::UnknownParticipant(_)));
}

#[tokio::test]
async fn host_rejoins_after_disconnect() {
    let server = Server::new();
    let (host, mut host_rx) = server.connect().await;

    host.handle(ClientEvent::Create).await.unwrap();
    let (host_id, session_id) = recv_assign(&mut host_rx).await;
    recv_update(&mut host_rx).await;
    let prior_connection = host.connection_id().clone();

    host.disconnect().await.unwrap();
    recv_update(&mut host_rx).await;

    let (returning, mut returning_rx) = server.connect().await;
    returning
        .handle(ClientEvent::Rejoin {
            session_id: session_id.clone(),
            participant_id: host_id.clone(),
            prior_connection_id: prior_connection,
        })
        .await
        .unwrap();

    let game = recv_update(&mut returning_rx).await;
    assert!(game.players[0].host);
    assert!(game.players[0].connected);
    recv_assign(&mut returning_rx).await;

    // Host authority follows the new connection
    let mut game = server.snapshot(&session_id).await;
    game.custom = Some(json!("resumed"));
    returning
        .handle(ClientEvent::Update { session_id, game })
        .await
        .unwrap();
    assert_eq!(
        recv_update(&mut returning_rx).await.custom,
        Some(json!("resumed"))
    );
}
