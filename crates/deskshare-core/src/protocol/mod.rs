//! Protocol module: signaling messages and the control-channel codec.

pub mod control;
pub mod signaling;

pub use control::{decode_event, encode_event, ControlCodecError, FrameSize, RemoteInputEvent};
pub use signaling::{
    ClientMessage, IceCandidate, IceServer, NegotiationMessage, NegotiationPayload, ServerMessage,
};
