//! Signaling WebSocket server: accept loop and per-connection tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from peers.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Registering the connection with the [`SignalingRelay`], which hands
//!    back the connection's identity and its outbound queue.
//! 5. Running two concurrent tasks per connection:
//!    - **Reader**: parses JSON text frames into [`ClientMessage`] and gives
//!      them to the relay.
//!    - **Writer**: drains the outbound queue into the socket.
//! 6. Unregistering the connection when either task ends, which releases
//!    any role it held.
//! 7. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Scalability
//!
//! Each connection runs in its own Tokio task.  The accept loop never blocks:
//! it accepts a connection and immediately spawns a task for it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use deskshare_core::ClientMessage;

use crate::application::{Outbound, SignalingRelay};

/// How often the accept loop re-checks the `running` flag while idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `addr` and runs the signaling accept loop until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_signaling_server(
    addr: SocketAddr,
    relay: Arc<SignalingRelay>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind signaling listener on {addr}"))?;

    info!("signaling WebSocket listening on {addr}");
    serve_signaling(listener, relay, running).await;
    Ok(())
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_signaling_server`] so tests can bind port 0 and read
/// back the chosen address before serving.
pub async fn serve_signaling(
    listener: TcpListener,
    relay: Arc<SignalingRelay>,
    running: Arc<AtomicBool>,
) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping signaling accept loop");
            break;
        }

        // Short timeout so the flag is re-checked even with no new peers.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new signaling connection from {peer_addr}");
                let relay = Arc::clone(&relay);
                tokio::spawn(async move {
                    handle_peer_connection(stream, peer_addr, relay).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Top-level handler for one signaling connection; logs the outcome of
/// [`run_connection`].
async fn handle_peer_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<SignalingRelay>,
) {
    match run_connection(raw_stream, peer_addr, relay).await {
        Ok(()) => info!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one signaling connection from handshake to unregistration.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.
async fn run_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<SignalingRelay>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (id, mut outbound) = relay.connect();
    info!("peer {id} connected from {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Writer: relay → socket ────────────────────────────────────────────────
    let mut writer_task = tokio::spawn(async move {
        while let Some(out) = outbound.recv().await {
            match out {
                Outbound::Message(msg) => {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("peer {id}: JSON serialization error: {e}");
                            continue;
                        }
                    };
                    debug!("relay → {id}: {}", msg.type_name());
                    if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                        debug!("peer {id}: WebSocket send failed (peer disconnected)");
                        break;
                    }
                }
                Outbound::Close => {
                    debug!("peer {id}: closing at relay's request");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    // ── Reader: socket → relay ────────────────────────────────────────────────
    let relay_reader = Arc::clone(&relay);
    let mut reader_task = tokio::spawn(async move {
        loop {
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("peer {id}: WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!("peer {id}: WebSocket error: {e}");
                    break;
                }
                None => {
                    debug!("peer {id}: stream ended");
                    break;
                }
            };

            match ws_msg {
                WsMessage::Text(text) => {
                    let msg: ClientMessage = match serde_json::from_str(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            // One bad frame does not end the connection.
                            warn!("peer {id}: invalid signaling JSON: {e}");
                            continue;
                        }
                    };
                    relay_reader.handle_message(id, msg);
                }
                WsMessage::Binary(_) => {
                    warn!("peer {id}: unexpected binary WebSocket frame (ignored)");
                }
                WsMessage::Ping(data) => {
                    debug!("peer {id}: WebSocket ping ({} bytes)", data.len());
                }
                WsMessage::Pong(_) => {}
                WsMessage::Close(_) => {
                    debug!("peer {id}: Close frame received");
                    break;
                }
                WsMessage::Frame(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer_task => {
            debug!("peer {id}: writer task ended");
            reader_task.abort();
        }
        _ = &mut reader_task => {
            debug!("peer {id}: reader task ended");
        }
    }

    // Dropping the relay's sender also ends the writer if it is still running.
    relay.disconnect(id);
    Ok(())
}
