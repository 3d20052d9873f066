//! # deskshare-core
//!
//! Shared library for deskshare containing the session model, the signaling
//! wire messages, and the control-channel codec.
//!
//! This crate is used by both the server and the peer applications.
//! It has zero dependencies on sockets, async runtimes, or media stacks.
//!
//! # Architecture overview (for beginners)
//!
//! deskshare lets two participants share a desktop through a browser-class
//! peer connection.  The *host* offers a video stream plus a control channel;
//! the *client* watches the stream and sends mouse and keyboard events back.
//! The two find each other through a short human-readable *session code*
//! handed out by the server.
//!
//! This crate (`deskshare-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure session model: the [`SessionCode`] newtype with its
//!   safe alphabet, participant roles, the derived [`SessionStatus`], and the
//!   [`SessionError`] taxonomy every other crate reports through.
//!
//! - **`protocol`** – How things travel over the wire.  `signaling` holds the
//!   JSON messages exchanged with the server over WebSocket; `control` holds
//!   the remote-input events sent peer-to-peer over the control channel.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `deskshare_core::SessionCode` instead of `deskshare_core::domain::code::SessionCode`.
pub use domain::code::SessionCode;
pub use domain::error::SessionError;
pub use domain::session::{ParticipantId, Role, SessionStatus};
pub use protocol::control::{ControlCodecError, FrameSize, RemoteInputEvent};
pub use protocol::signaling::{
    ClientMessage, IceCandidate, IceServer, NegotiationMessage, NegotiationPayload, ServerMessage,
};
