//! Infrastructure layer for the peer.
//!
//! Contains the adapters behind the application ports: the REST and
//! WebSocket clients, the WebRTC transport, the capture source, and the
//! input sink.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `deskshare_core`, but MUST NOT be imported by the `application` or domain
//! layers (tests excepted).
//!
//! # Sub-modules
//!
//! - **`api_client`** – `reqwest` client for session create and lookup.
//!
//! - **`signaling_client`** – `tokio-tungstenite` connection to the signaling
//!   server with a reader and a writer task.
//!
//! - **`webrtc_transport`** – `RTCPeerConnection` with the `control` data
//!   channel and a VP8 sample track.
//!
//! - **`capture`** – Replays a VP8 IVF recording as the host's screen.
//!
//! - **`input_log`** – Logs applied remote input.
//!
//! - **`mock`** – Recording doubles for every port, used by unit and
//!   integration tests.

pub mod api_client;
pub mod capture;
pub mod input_log;
pub mod mock;
pub mod signaling_client;
pub mod webrtc_transport;

pub use api_client::{ApiClient, ApiClientError};
pub use capture::IvfFileCapture;
pub use input_log::LoggingInputSink;
pub use signaling_client::{SignalingClientError, WsSignalingConnector};
pub use webrtc_transport::{WebRtcTransport, WebRtcTransportFactory};
