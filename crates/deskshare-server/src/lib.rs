//! deskshare-server library crate.
//!
//! This crate hands out session codes, remembers which participant holds
//! which role, and relays negotiation messages between the two peers of a
//! session until they can talk directly.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Peers (JSON over WebSocket)         Browsers / CLI (JSON over HTTP)
//!         ↕                                      ↕
//! [deskshare-server]
//!   ├── domain/           Pure types: SessionRecord, ServerConfig
//!   ├── application/      SessionRegistry (codes, roles, expiry)
//!   │                     SignalingRelay  (join, forward, notify)
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         ├── http_api/   REST endpoints (axum)
//!         ├── sweeper/    Periodic expiry sweep
//!         └── config_file/ Optional TOML configuration
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `deskshare-core`; the relay only
//!   touches tokio's channel types, never sockets.
//! - `infrastructure` depends on all other layers plus `tokio`, `axum`, and
//!   `tungstenite`.
//!
//! # For beginners: why is the relay separate from the WebSocket server?
//!
//! The relay decides *who receives what*; the WebSocket server only moves
//! frames.  Each connection gets an `mpsc` channel, and the relay writes to
//! that channel.  Tests can therefore drive the whole join/offer/disconnect
//! protocol with plain channels, no sockets involved.

/// Domain layer: session records and configuration (no I/O).
pub mod domain;

/// Application layer: the session registry and the signaling relay.
pub mod application;

/// Infrastructure layer: WebSocket server, REST API, sweeper, config file.
pub mod infrastructure;
