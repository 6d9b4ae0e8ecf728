//! WebSocket client transport.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

use super::transport::{ClientTransport, Connector};
use crate::error::RemoteStateError;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::Result;

/// Connector that dials a remote-state server's `/ws` endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// `url` is the full WebSocket endpoint, e.g. `ws://host:3000/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn ClientTransport>> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RemoteStateError::Transport(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ClientTransport for WsTransport {
    async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let json = serde_json::to_string(&event)?;
        self.stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| RemoteStateError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(event) => return Some(event),
                    Err(err) => {
                        warn!(error = %err, "unparseable server event skipped");
                    }
                },
                Ok(Message::Close(_)) => return None,
                // Pings are answered by the stream itself on read.
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }
}
