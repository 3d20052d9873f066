//! Integration tests for the deskshare-core wire protocols.
//!
//! These tests drive the public API the way the server and the peers use it:
//! a client's signaling request is relayed into a delivery for the other
//! peer, and remote-input events cross the control channel codec intact.

use deskshare_core::{
    protocol::control::{
        decode_event, encode_event, KeyPress, KeyRelease, MouseButton, PointerButton,
        PointerPosition, ScrollDelta, EVENT_TAGS,
    },
    ClientMessage, FrameSize, IceCandidate, ParticipantId, RemoteInputEvent, Role, ServerMessage,
    SessionCode,
};

fn every_event() -> Vec<RemoteInputEvent> {
    let button = PointerButton {
        x: 0.5,
        y: 0.75,
        button: MouseButton::Primary,
    };
    vec![
        RemoteInputEvent::MouseMove(PointerPosition { x: 0.125, y: 0.875 }),
        RemoteInputEvent::MouseClick(button),
        RemoteInputEvent::MouseDown(PointerButton {
            button: MouseButton::Secondary,
            ..button
        }),
        RemoteInputEvent::MouseUp(PointerButton {
            button: MouseButton::Middle,
            ..button
        }),
        RemoteInputEvent::KeyPress(KeyPress {
            key: "Enter".to_string(),
            code: "Enter".to_string(),
            ctrl_key: false,
            alt_key: true,
            shift_key: true,
            meta_key: false,
        }),
        RemoteInputEvent::KeyRelease(KeyRelease {
            key: "Enter".to_string(),
            code: "Enter".to_string(),
        }),
        RemoteInputEvent::Scroll(ScrollDelta {
            delta_x: -3.0,
            delta_y: 100.0,
        }),
    ]
}

#[test]
fn test_every_event_tag_survives_the_codec() {
    let events = every_event();

    // Every tag the codec knows is covered exactly once.
    let mut tags: Vec<&str> = events.iter().map(RemoteInputEvent::tag).collect();
    tags.sort_unstable();
    let mut expected = EVENT_TAGS.to_vec();
    expected.sort_unstable();
    assert_eq!(tags, expected);

    for event in events {
        let text = encode_event(&event).expect("encode must succeed");
        assert_eq!(decode_event(&text).expect("decode must succeed"), event);
    }
}

#[test]
fn test_pointer_event_maps_between_sender_frame_and_receiver_viewport() {
    // Arrange: the client watches the stream in an 800×450 element and
    // clicks at (200, 300).
    let sender_frame = FrameSize::new(800, 450);
    let (x, y) = sender_frame.normalize(200.0, 300.0);
    let event = RemoteInputEvent::MouseClick(PointerButton {
        x,
        y,
        button: MouseButton::Primary,
    });

    // Act: it crosses the channel and lands on a 2560×1440 host screen.
    let received = decode_event(&encode_event(&event).unwrap()).unwrap();
    let (nx, ny) = received.pointer().unwrap();
    let host = FrameSize::new(2560, 1440);

    // Assert
    assert_eq!(host.denormalize(nx, ny), (640, 960));
}

#[test]
fn test_offer_relay_flow_from_json_to_json() {
    // Arrange: a host sends an offer for the client through the server.
    let host = ParticipantId::new();
    let client = ParticipantId::new();
    let inbound = format!(r#"{{"type":"offer","sdp":"v=0\r\n","target":"{client}"}}"#);

    // Act: the server parses, stamps the sender, and serializes a delivery.
    let request: ClientMessage = serde_json::from_str(&inbound).unwrap();
    let relayed = request.into_negotiation(host).unwrap();
    assert_eq!(relayed.target, client);
    let outbound = serde_json::to_string(&relayed.into_delivery()).unwrap();

    // Assert: the client sees the offer from the host, SDP untouched.
    let delivered: ServerMessage = serde_json::from_str(&outbound).unwrap();
    assert_eq!(
        delivered,
        ServerMessage::Offer {
            sdp: "v=0\r\n".to_string(),
            from: host,
        }
    );
}

#[test]
fn test_candidate_relay_preserves_fields() {
    let sender = ParticipantId::new();
    let target = ParticipantId::new();
    let candidate = IceCandidate {
        candidate: "candidate:2 1 tcp 1518280447 10.0.0.2 9 typ host tcptype active".to_string(),
        sdp_mid: Some("video".to_string()),
        sdp_mline_index: Some(1),
        username_fragment: Some("abcd".to_string()),
    };

    let delivered = ClientMessage::IceCandidate {
        candidate: candidate.clone(),
        target,
    }
    .into_negotiation(sender)
    .unwrap()
    .into_delivery();

    assert_eq!(
        delivered,
        ServerMessage::IceCandidate {
            candidate,
            from: sender
        }
    );
}

#[test]
fn test_join_reply_round_trip_carries_normalised_code() {
    let code = SessionCode::parse("hjk234").unwrap();
    let reply = ServerMessage::SessionJoined {
        peer_id: ParticipantId::new(),
        session_code: code.to_string(),
        role: Role::Client,
        ice_servers: Vec::new(),
    };

    let back: ServerMessage = serde_json::from_str(&serde_json::to_string(&reply).unwrap()).unwrap();

    assert_eq!(back, reply);
    assert!(serde_json::to_string(&reply).unwrap().contains("\"HJK234\""));
}
