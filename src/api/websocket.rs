//! WebSocket handler binding sockets to protocol engines.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use super::router::AppState;
use crate::engine::Engine;
use crate::error::RemoteStateError;
use crate::fabric::Fabric;
use crate::protocol::{ClientEvent, ServerEvent};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one connection: register with the fabric, pump the mailbox out,
/// and feed inbound frames to the engine until the socket closes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, mut mailbox) = state.fabric.register().await;
    let engine = Engine::new(state.ctx.clone(), connection_id.clone());
    debug!(connection = %connection_id, "socket connected");

    let (mut sink, mut stream) = socket.split();

    // Outbound: everything the engine addresses to this connection,
    // starting with the welcome event already queued by register.
    let pump = tokio::spawn(async move {
        while let Some(event) = mailbox.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound: parse each text frame into a verb. Malformed payloads
    // are rejected before any rule logic runs; verb errors are reported
    // by the engine itself.
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => {
                let _ = engine.handle(event).await;
            }
            Err(err) => {
                let err = RemoteStateError::Validation(err.to_string());
                let _ = state
                    .fabric
                    .send_to_connection(&connection_id, ServerEvent::error(&err))
                    .await;
            }
        }
    }

    let _ = engine.disconnect().await;
    state.fabric.unregister(&connection_id).await;
    pump.abort();
    debug!(connection = %connection_id, "socket closed");
}
