//! deskshare-peer library crate.
//!
//! One peer process either *hosts* a session (shares its screen and applies
//! the other side's input) or *joins* one as the client (watches the stream
//! and sends input back).  Both sides find each other through the server's
//! session code and then talk directly over a peer connection.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! [deskshare-peer]
//!   ├── domain/           Pure types: PeerConfig, LifecycleState, NegotiationState
//!   ├── application/      SessionLifecycle (create/join, restart, teardown)
//!   │                     Negotiator       (offer/answer/candidates, timeout)
//!   │                     RemoteInputUseCase, TrackSwitch, ports
//!   └── infrastructure/
//!         ├── api_client/        REST session directory (reqwest)
//!         ├── signaling_client/  WebSocket signaling (tokio-tungstenite)
//!         ├── webrtc_transport/  Peer connection, control channel, VP8 track
//!         ├── capture/           IVF file replay as the screen source
//!         ├── input_log/         Input sink that logs applied events
//!         └── mock/              Recording doubles for every port
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` only sees the traits in `application::ports`.
//! - `infrastructure` implements those traits on top of real crates.

/// Domain layer: configuration and the lifecycle state machine.
pub mod domain;

/// Application layer: lifecycle orchestration and negotiation.
pub mod application;

/// Infrastructure layer: network, media, and input adapters.
pub mod infrastructure;
