//! JSON message types for the signaling WebSocket.
//!
//! Peers never talk to each other directly until negotiation succeeds.  Until
//! then every message goes through the server:
//!
//! ```text
//! Peer → Server:  JSON text frame  →  ClientMessage
//! Server → Peer:  ServerMessage    →  JSON text frame
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field naming the variant in
//! kebab-case.  All other fields are camelCase and live in the same object:
//!
//! ```json
//! {"type":"join-session","sessionCode":"AB2CDE","role":"host"}
//! {"type":"offer","sdp":"v=0...","target":"6f1c..."}
//! ```
//!
//! # Negotiation messages
//!
//! `offer`, `answer`, and `ice-candidate` are the only messages the relay
//! forwards.  A peer addresses them with `target`; the server replaces
//! `target` with `from` before delivery.  [`NegotiationMessage`] is the
//! direction-neutral form the relay works with.

use serde::{Deserialize, Serialize};

use crate::domain::{ParticipantId, Role};

// ── Shared payload types ──────────────────────────────────────────────────────

/// A STUN or TURN server handed to peers when they join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less server, the usual shape for public STUN.
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// One ICE candidate in the browser's `RTCIceCandidateInit` shape.
///
/// The relay treats this as opaque; only the peers interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

// ── Peer → Server ─────────────────────────────────────────────────────────────

/// Every message a peer can send to the signaling server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Bind this connection to a role in a session.
    ///
    /// The code is carried as a raw string so the server can answer a
    /// malformed code with a `session-error` instead of a parse failure.
    #[serde(rename_all = "camelCase")]
    JoinSession { session_code: String, role: Role },

    /// Give up the role without closing the WebSocket.
    LeaveSession,

    Offer { sdp: String, target: ParticipantId },

    Answer { sdp: String, target: ParticipantId },

    IceCandidate {
        candidate: IceCandidate,
        target: ParticipantId,
    },
}

impl ClientMessage {
    /// Converts a negotiation message into its relay form, stamping the sender.
    ///
    /// Returns `None` for control messages (`join-session`, `leave-session`).
    pub fn into_negotiation(self, from: ParticipantId) -> Option<NegotiationMessage> {
        let (target, payload) = match self {
            ClientMessage::Offer { sdp, target } => (target, NegotiationPayload::Offer { sdp }),
            ClientMessage::Answer { sdp, target } => (target, NegotiationPayload::Answer { sdp }),
            ClientMessage::IceCandidate { candidate, target } => {
                (target, NegotiationPayload::IceCandidate { candidate })
            }
            ClientMessage::JoinSession { .. } | ClientMessage::LeaveSession => return None,
        };
        Some(NegotiationMessage {
            from,
            target,
            payload,
        })
    }

    /// Short variant name for logs; never includes SDP or candidate text.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinSession { .. } => "join-session",
            ClientMessage::LeaveSession => "leave-session",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
        }
    }
}

// ── Server → Peer ─────────────────────────────────────────────────────────────

/// Every message the signaling server can send to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// The join succeeded; `peer_id` is this connection's identity.
    #[serde(rename_all = "camelCase")]
    SessionJoined {
        peer_id: ParticipantId,
        session_code: String,
        role: Role,
        ice_servers: Vec<IceServer>,
    },

    /// A join or relay request failed.
    SessionError { error: String },

    /// The other role was bound.
    #[serde(rename_all = "camelCase")]
    PeerJoined { peer_id: ParticipantId, role: Role },

    /// The other role was released.
    #[serde(rename_all = "camelCase")]
    PeerLeft { peer_id: ParticipantId, role: Role },

    /// The session was swept or closed; the server disconnects next.
    #[serde(rename_all = "camelCase")]
    SessionExpired { session_code: String },

    Offer { sdp: String, from: ParticipantId },

    Answer { sdp: String, from: ParticipantId },

    IceCandidate {
        candidate: IceCandidate,
        from: ParticipantId,
    },
}

impl ServerMessage {
    /// Converts a relayed negotiation message back into a negotiation
    /// message addressed to `target`.
    ///
    /// Returns `None` for every non-negotiation variant.
    pub fn into_negotiation(self, target: ParticipantId) -> Option<NegotiationMessage> {
        let (from, payload) = match self {
            ServerMessage::Offer { sdp, from } => (from, NegotiationPayload::Offer { sdp }),
            ServerMessage::Answer { sdp, from } => (from, NegotiationPayload::Answer { sdp }),
            ServerMessage::IceCandidate { candidate, from } => {
                (from, NegotiationPayload::IceCandidate { candidate })
            }
            _ => return None,
        };
        Some(NegotiationMessage {
            from,
            target,
            payload,
        })
    }

    /// Short variant name for logs; never includes SDP or candidate text.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::SessionJoined { .. } => "session-joined",
            ServerMessage::SessionError { .. } => "session-error",
            ServerMessage::PeerJoined { .. } => "peer-joined",
            ServerMessage::PeerLeft { .. } => "peer-left",
            ServerMessage::SessionExpired { .. } => "session-expired",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
        }
    }
}

// ── Relay form ────────────────────────────────────────────────────────────────

/// The payload of a negotiation message, uninterpreted by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate { candidate: IceCandidate },
}

impl NegotiationPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            NegotiationPayload::Offer { .. } => "offer",
            NegotiationPayload::Answer { .. } => "answer",
            NegotiationPayload::IceCandidate { .. } => "ice-candidate",
        }
    }
}

/// A negotiation message with both endpoints known.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationMessage {
    pub from: ParticipantId,
    pub target: ParticipantId,
    pub payload: NegotiationPayload,
}

impl NegotiationMessage {
    /// Builds the message delivered to `target`: `target` is dropped and
    /// `from` attached, the payload is passed through unchanged.
    pub fn into_delivery(self) -> ServerMessage {
        let from = self.from;
        match self.payload {
            NegotiationPayload::Offer { sdp } => ServerMessage::Offer { sdp, from },
            NegotiationPayload::Answer { sdp } => ServerMessage::Answer { sdp, from },
            NegotiationPayload::IceCandidate { candidate } => {
                ServerMessage::IceCandidate { candidate, from }
            }
        }
    }

    /// Builds the message a peer sends to the server for this negotiation.
    pub fn into_request(self) -> ClientMessage {
        let target = self.target;
        match self.payload {
            NegotiationPayload::Offer { sdp } => ClientMessage::Offer { sdp, target },
            NegotiationPayload::Answer { sdp } => ClientMessage::Answer { sdp, target },
            NegotiationPayload::IceCandidate { candidate } => {
                ClientMessage::IceCandidate { candidate, target }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate() -> IceCandidate {
        IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.168.1.4 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn test_join_session_wire_shape() {
        // Arrange
        let raw = json!({"type": "join-session", "sessionCode": "ab2cde", "role": "client"});

        // Act
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();

        // Assert: the code is passed through untouched; the server normalises it.
        assert_eq!(
            msg,
            ClientMessage::JoinSession {
                session_code: "ab2cde".to_string(),
                role: Role::Client,
            }
        );
    }

    #[test]
    fn test_session_joined_wire_shape() {
        let peer_id = ParticipantId::new();
        let msg = ServerMessage::SessionJoined {
            peer_id,
            session_code: "AB2CDE".to_string(),
            role: Role::Host,
            ice_servers: vec![IceServer::stun("stun:stun.l.google.com:19302")],
        };

        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "session-joined");
        assert_eq!(value["peerId"], peer_id.to_string());
        assert_eq!(value["sessionCode"], "AB2CDE");
        assert_eq!(value["role"], "host");
        assert_eq!(
            value["iceServers"],
            json!([{"urls": ["stun:stun.l.google.com:19302"]}])
        );
    }

    #[test]
    fn test_ice_candidate_uses_browser_field_names() {
        let value = serde_json::to_value(candidate()).unwrap();
        assert!(value.get("sdpMid").is_some());
        assert!(value.get("sdpMLineIndex").is_some());
        assert!(value.get("usernameFragment").is_none());
    }

    #[test]
    fn test_ice_candidate_accepts_missing_optional_fields() {
        let c: IceCandidate = serde_json::from_value(json!({"candidate": ""})).unwrap();
        assert_eq!(c.sdp_mid, None);
        assert_eq!(c.sdp_mline_index, None);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({"type": "webrtc-renegotiate"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({"sdp": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_relay_replaces_target_with_from() {
        // Arrange
        let sender = ParticipantId::new();
        let target = ParticipantId::new();
        let request = ClientMessage::IceCandidate {
            candidate: candidate(),
            target,
        };

        // Act
        let relayed = request.into_negotiation(sender).unwrap();
        assert_eq!(relayed.target, target);
        let delivered = serde_json::to_value(relayed.into_delivery()).unwrap();

        // Assert
        assert_eq!(delivered["type"], "ice-candidate");
        assert_eq!(delivered["from"], sender.to_string());
        assert!(delivered.get("target").is_none());
        assert_eq!(delivered["candidate"], serde_json::to_value(candidate()).unwrap());
    }

    #[test]
    fn test_control_messages_are_not_negotiation() {
        let from = ParticipantId::new();
        assert!(ClientMessage::LeaveSession.into_negotiation(from).is_none());
        assert!(ServerMessage::SessionError {
            error: "x".to_string()
        }
        .into_negotiation(from)
        .is_none());
    }

    #[test]
    fn test_request_and_delivery_are_inverse_views() {
        let me = ParticipantId::new();
        let peer = ParticipantId::new();
        let outgoing = NegotiationMessage {
            from: me,
            target: peer,
            payload: NegotiationPayload::Offer {
                sdp: "v=0".to_string(),
            },
        };

        // What the peer sends and what the server would deliver describe the
        // same negotiation message.
        let as_request = outgoing.clone().into_request();
        assert_eq!(as_request.into_negotiation(me).unwrap(), outgoing);
        let as_delivery = outgoing.clone().into_delivery();
        assert_eq!(as_delivery.into_negotiation(peer).unwrap(), outgoing);
    }

    #[test]
    fn test_type_names_do_not_leak_sdp() {
        let msg = ClientMessage::Offer {
            sdp: "secret-sdp".to_string(),
            target: ParticipantId::new(),
        };
        assert_eq!(msg.type_name(), "offer");
    }
}
