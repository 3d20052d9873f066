//! WebSocket signaling client.
//!
//! Architecture:
//! - `WsSignalingConnector::connect` opens the socket under a timeout.
//! - A writer task serializes [`ClientMessage`]s from an `mpsc` channel onto
//!   the socket.  Dropping the sender closes the socket.
//! - A reader task parses text frames into [`ServerMessage`]s and forwards
//!   them.  Unparseable frames are logged and skipped.

use std::time::Duration;

use async_trait::async_trait;
use deskshare_core::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::application::ports::{SignalingConnector, SignalingError, SignalingLink};

/// Capacity of each direction's queue.
const QUEUE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum SignalingClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connect to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
}

impl From<SignalingClientError> for SignalingError {
    fn from(err: SignalingClientError) -> Self {
        match err {
            SignalingClientError::Timeout { after, .. } => SignalingError::Timeout(after),
            other => SignalingError::Unreachable(other.to_string()),
        }
    }
}

pub struct WsSignalingConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsSignalingConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    async fn open(&self) -> Result<SignalingLink, SignalingClientError> {
        info!("connecting to signaling server {}", self.url);
        let connecting = connect_async(self.url.as_str());
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| SignalingClientError::Timeout {
                url: self.url.clone(),
                after: self.connect_timeout,
            })??;
        debug!("signaling connected");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel::<ServerMessage>(QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("could not encode {}: {e}", msg.type_name());
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(WsMessage::Text(json)).await {
                    warn!("signaling send failed: {e}");
                    break;
                }
            }
            let _ = ws_tx.send(WsMessage::Close(None)).await;
            debug!("signaling writer finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if in_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("ignoring malformed signaling message: {e}"),
                    },
                    Ok(WsMessage::Close(_)) => {
                        info!("signaling server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("signaling receive failed: {e}");
                        break;
                    }
                }
            }
            debug!("signaling reader finished");
        });

        Ok(SignalingLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[async_trait]
impl SignalingConnector for WsSignalingConnector {
    async fn connect(&self) -> Result<SignalingLink, SignalingError> {
        self.open().await.map_err(Into::into)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use deskshare_core::{ParticipantId, Role};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Accepts one WebSocket, echoes a `session-joined` for the first join,
    /// then sends one garbage frame and one `peer-left`.
    async fn fake_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
                let msg: ClientMessage = serde_json::from_str(&text).unwrap();
                if let ClientMessage::JoinSession { session_code, role } = msg {
                    let reply = ServerMessage::SessionJoined {
                        peer_id: ParticipantId::new(),
                        session_code,
                        role,
                        ice_servers: Vec::new(),
                    };
                    ws.send(WsMessage::Text(serde_json::to_string(&reply).unwrap()))
                        .await
                        .unwrap();
                    ws.send(WsMessage::Text("{not json".into())).await.unwrap();
                    let left = ServerMessage::PeerLeft {
                        peer_id: ParticipantId::new(),
                        role: Role::Client,
                    };
                    ws.send(WsMessage::Text(serde_json::to_string(&left).unwrap()))
                        .await
                        .unwrap();
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_messages_round_trip_over_websocket() {
        // Arrange
        let url = fake_server().await;
        let connector = WsSignalingConnector::new(url, Duration::from_secs(5));

        // Act
        let mut link = connector.connect().await.unwrap();
        link.outbound
            .send(ClientMessage::JoinSession {
                session_code: "AB2CDE".into(),
                role: Role::Host,
            })
            .await
            .unwrap();
        let first = link.inbound.recv().await.unwrap();
        let second = link.inbound.recv().await.unwrap();

        // Assert: the malformed frame in between is skipped.
        assert!(matches!(
            first,
            ServerMessage::SessionJoined { ref session_code, role: Role::Host, .. } if session_code == "AB2CDE"
        ));
        assert!(matches!(second, ServerMessage::PeerLeft { role: Role::Client, .. }));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WsSignalingConnector::new(format!("ws://{addr}"), Duration::from_secs(5));
        let result = connector.connect().await;

        assert!(matches!(result, Err(SignalingError::Unreachable(_))));
    }

    #[test]
    fn test_timeout_maps_to_signaling_timeout() {
        let err = SignalingClientError::Timeout {
            url: "ws://x".into(),
            after: Duration::from_secs(3),
        };
        assert_eq!(SignalingError::from(err), SignalingError::Timeout(Duration::from_secs(3)));
    }
}
