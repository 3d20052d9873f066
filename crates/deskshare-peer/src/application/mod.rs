//! Application layer for deskshare-peer.
//!
//! # Use cases
//!
//! - **`lifecycle`** – The session orchestrator.  Creates or joins a session,
//!   keeps the signaling connection, restarts failed handshakes, and tears
//!   everything down in order.
//!
//! - **`negotiation`** – One participant's side of the offer/answer/ICE
//!   exchange over a [`ports::PeerTransport`].
//!
//! - **`remote_input`** – Applies control-channel events on the host through
//!   an [`remote_input::InputSink`].
//!
//! - **`media`** – Routes captured frames to the video track of whichever
//!   transport is current.
//!
//! # What does NOT belong here?
//!
//! - WebSocket, HTTP, or WebRTC code: those live behind the traits in
//!   [`ports`] and are implemented in `infrastructure`.

pub mod lifecycle;
pub mod media;
pub mod negotiation;
pub mod ports;
pub mod remote_input;

pub use lifecycle::{
    LifecycleCommand, LifecycleError, LifecycleHandle, PeerServices, SessionLifecycle,
};
pub use media::TrackSwitch;
pub use negotiation::{NegotiationError, NegotiationEvent, Negotiator};
pub use remote_input::{ButtonAction, InputError, InputSink, Modifiers, RemoteInputUseCase};
