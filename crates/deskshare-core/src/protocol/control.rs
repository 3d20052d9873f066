//! Control-channel codec for remote-input events.
//!
//! Once the peers are connected, the client sends mouse and keyboard events
//! to the host over a reliable, ordered data channel labelled `control`.
//! Each channel message carries exactly one [`RemoteInputEvent`]:
//!
//! ```json
//! {"type":"mouse-move","payload":{"x":0.25,"y":0.5}}
//! {"type":"key-press","payload":{"key":"a","code":"KeyA","ctrlKey":false,"altKey":false,"shiftKey":false,"metaKey":false}}
//! ```
//!
//! # Coordinates
//!
//! Pointer positions are *normalised* to `[0, 1]` against the sender's video
//! frame and *denormalised* against the receiver's viewport.  The mapping is
//! resolution-independent and lossy (the receiver rounds to whole pixels);
//! it is not meant to be pixel-accurate.
//!
//! # Unknown events
//!
//! A message with an unrecognised `type` is a decode error
//! ([`ControlCodecError::UnknownTag`]).  Receivers log it and move on with
//! [`decode_or_drop`]; a bad message never closes the channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Label of the data channel that carries control events.
pub const CONTROL_CHANNEL_LABEL: &str = "control";

/// Every wire tag the codec understands.
pub const EVENT_TAGS: [&str; 7] = [
    "mouse-move",
    "mouse-click",
    "mouse-down",
    "mouse-up",
    "key-press",
    "key-release",
    "scroll",
];

/// Errors produced while decoding a control message.
#[derive(Debug, Error, PartialEq)]
pub enum ControlCodecError {
    /// The message is valid JSON but its `type` is not an event tag.
    #[error("unknown control event type '{0}'")]
    UnknownTag(String),

    /// The message is not JSON, has no `type`, or its payload has the wrong shape.
    #[error("malformed control message: {0}")]
    Malformed(String),
}

// ── Event types ───────────────────────────────────────────────────────────────

/// Mouse button as numbered by DOM `MouseEvent.button`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MouseButton {
    Primary,
    Middle,
    Secondary,
}

impl TryFrom<u8> for MouseButton {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MouseButton::Primary),
            1 => Ok(MouseButton::Middle),
            2 => Ok(MouseButton::Secondary),
            other => Err(format!("unsupported mouse button {other}")),
        }
    }
}

impl From<MouseButton> for u8 {
    fn from(button: MouseButton) -> Self {
        match button {
            MouseButton::Primary => 0,
            MouseButton::Middle => 1,
            MouseButton::Secondary => 2,
        }
    }
}

/// A normalised pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

/// A normalised pointer position with the button involved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerButton {
    pub x: f64,
    pub y: f64,
    pub button: MouseButton,
}

/// A key going down, with the modifier state at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPress {
    /// DOM `KeyboardEvent.key`, e.g. `"a"` or `"Enter"`.
    pub key: String,
    /// DOM `KeyboardEvent.code`, e.g. `"KeyA"`.
    pub code: String,
    pub ctrl_key: bool,
    pub alt_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRelease {
    pub key: String,
    pub code: String,
}

/// Wheel movement in DOM delta units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollDelta {
    pub delta_x: f64,
    pub delta_y: f64,
}

/// One remote-input event on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum RemoteInputEvent {
    MouseMove(PointerPosition),
    MouseClick(PointerButton),
    MouseDown(PointerButton),
    MouseUp(PointerButton),
    KeyPress(KeyPress),
    KeyRelease(KeyRelease),
    Scroll(ScrollDelta),
}

impl RemoteInputEvent {
    /// Returns the wire tag of this event.
    pub fn tag(&self) -> &'static str {
        match self {
            RemoteInputEvent::MouseMove(_) => "mouse-move",
            RemoteInputEvent::MouseClick(_) => "mouse-click",
            RemoteInputEvent::MouseDown(_) => "mouse-down",
            RemoteInputEvent::MouseUp(_) => "mouse-up",
            RemoteInputEvent::KeyPress(_) => "key-press",
            RemoteInputEvent::KeyRelease(_) => "key-release",
            RemoteInputEvent::Scroll(_) => "scroll",
        }
    }

    /// Returns the normalised pointer position, if the event has one.
    pub fn pointer(&self) -> Option<(f64, f64)> {
        match self {
            RemoteInputEvent::MouseMove(p) => Some((p.x, p.y)),
            RemoteInputEvent::MouseClick(p)
            | RemoteInputEvent::MouseDown(p)
            | RemoteInputEvent::MouseUp(p) => Some((p.x, p.y)),
            _ => None,
        }
    }

    /// Treats pointer coordinates as pixels inside `frame` (the video frame
    /// as the sender sees it) and maps them to `[0, 1]`.  Other events are
    /// returned unchanged.
    pub fn normalized_in(self, frame: &FrameSize) -> Self {
        self.map_pointer(|x, y| frame.normalize(x, y))
    }

    fn map_pointer(self, f: impl Fn(f64, f64) -> (f64, f64)) -> Self {
        let button = |p: PointerButton| {
            let (x, y) = f(p.x, p.y);
            PointerButton { x, y, ..p }
        };
        match self {
            RemoteInputEvent::MouseMove(p) => {
                let (x, y) = f(p.x, p.y);
                RemoteInputEvent::MouseMove(PointerPosition { x, y })
            }
            RemoteInputEvent::MouseClick(p) => RemoteInputEvent::MouseClick(button(p)),
            RemoteInputEvent::MouseDown(p) => RemoteInputEvent::MouseDown(button(p)),
            RemoteInputEvent::MouseUp(p) => RemoteInputEvent::MouseUp(button(p)),
            other => other,
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            RemoteInputEvent::Scroll(d) => d.delta_x.is_finite() && d.delta_y.is_finite(),
            other => other
                .pointer()
                .map_or(true, |(x, y)| x.is_finite() && y.is_finite()),
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Encodes one event as a JSON text message.
///
/// Pointer coordinates are clamped to `[0, 1]` first, so a drag that leaves
/// the video element still lands on the frame edge at the receiver.
///
/// # Errors
///
/// Returns [`ControlCodecError::Malformed`] if a float is not finite (JSON
/// cannot represent NaN or infinity).
pub fn encode_event(event: &RemoteInputEvent) -> Result<String, ControlCodecError> {
    if !event.is_finite() {
        return Err(ControlCodecError::Malformed(format!(
            "non-finite coordinate in {} event",
            event.tag()
        )));
    }
    let event = clamp_pointer(event.clone());
    serde_json::to_string(&event).map_err(|e| ControlCodecError::Malformed(e.to_string()))
}

/// Decodes one JSON text message into an event.
///
/// # Errors
///
/// - [`ControlCodecError::UnknownTag`] if `type` is not one of [`EVENT_TAGS`].
/// - [`ControlCodecError::Malformed`] for anything else that does not parse.
pub fn decode_event(text: &str) -> Result<RemoteInputEvent, ControlCodecError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ControlCodecError::Malformed(e.to_string()))?;

    let tag = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ControlCodecError::Malformed("missing \"type\" field".to_string()))?;

    if !EVENT_TAGS.contains(&tag) {
        return Err(ControlCodecError::UnknownTag(tag.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ControlCodecError::Malformed(e.to_string()))
}

/// Decodes a message, logging and discarding anything that fails.
pub fn decode_or_drop(text: &str) -> Option<RemoteInputEvent> {
    match decode_event(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("dropping control message: {e}");
            None
        }
    }
}

fn clamp_pointer(event: RemoteInputEvent) -> RemoteInputEvent {
    event.map_pointer(|x, y| (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)))
}

// ── Coordinate mapping ────────────────────────────────────────────────────────

/// Pixel dimensions of a video frame or a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Maps a pixel position inside this frame to `[0, 1]`.
    ///
    /// A zero-sized frame maps every position to the origin.
    pub fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        if self.width == 0 || self.height == 0 {
            return (0.0, 0.0);
        }
        (
            (x / f64::from(self.width)).clamp(0.0, 1.0),
            (y / f64::from(self.height)).clamp(0.0, 1.0),
        )
    }

    /// Maps a normalised position onto this viewport, rounding to whole pixels.
    pub fn denormalize(&self, x: f64, y: f64) -> (i32, i32) {
        (
            (x * f64::from(self.width)).round() as i32,
            (y * f64::from(self.height)).round() as i32,
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn press_a() -> RemoteInputEvent {
        RemoteInputEvent::KeyPress(KeyPress {
            key: "a".to_string(),
            code: "KeyA".to_string(),
            ctrl_key: true,
            alt_key: false,
            shift_key: false,
            meta_key: false,
        })
    }

    #[test]
    fn test_mouse_move_wire_shape() {
        let event = RemoteInputEvent::MouseMove(PointerPosition { x: 0.25, y: 0.5 });
        let value: serde_json::Value =
            serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(value, json!({"type": "mouse-move", "payload": {"x": 0.25, "y": 0.5}}));
    }

    #[test]
    fn test_key_press_wire_shape_uses_dom_field_names() {
        let value: serde_json::Value =
            serde_json::from_str(&encode_event(&press_a()).unwrap()).unwrap();
        assert_eq!(value["type"], "key-press");
        assert_eq!(value["payload"]["ctrlKey"], true);
        assert_eq!(value["payload"]["code"], "KeyA");
    }

    #[test]
    fn test_button_is_numeric_on_the_wire() {
        let event = RemoteInputEvent::MouseDown(PointerButton {
            x: 0.1,
            y: 0.2,
            button: MouseButton::Secondary,
        });
        let value: serde_json::Value =
            serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(value["payload"]["button"], 2);
    }

    #[test]
    fn test_decode_browser_scroll() {
        let text = r#"{"type":"scroll","payload":{"deltaX":0,"deltaY":-120}}"#;
        assert_eq!(
            decode_event(text).unwrap(),
            RemoteInputEvent::Scroll(ScrollDelta {
                delta_x: 0.0,
                delta_y: -120.0
            })
        );
    }

    #[test]
    fn test_unknown_tag_is_a_decode_error() {
        let text = r#"{"type":"clipboard","payload":{"text":"hi"}}"#;
        assert_eq!(
            decode_event(text),
            Err(ControlCodecError::UnknownTag("clipboard".to_string()))
        );
    }

    #[test]
    fn test_unknown_tag_is_dropped_not_propagated() {
        assert_eq!(decode_or_drop(r#"{"type":"gamepad","payload":{}}"#), None);
    }

    #[test]
    fn test_missing_type_is_malformed() {
        assert!(matches!(
            decode_event(r#"{"payload":{"x":1,"y":1}}"#),
            Err(ControlCodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_wrong_payload_shape_is_malformed() {
        assert!(matches!(
            decode_event(r#"{"type":"mouse-move","payload":{"x":"left"}}"#),
            Err(ControlCodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_invalid_button_is_malformed() {
        assert!(matches!(
            decode_event(r#"{"type":"mouse-click","payload":{"x":0,"y":0,"button":7}}"#),
            Err(ControlCodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(
            decode_event("mouse-move 1 2"),
            Err(ControlCodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_encode_clamps_out_of_frame_pointer() {
        let event = RemoteInputEvent::MouseUp(PointerButton {
            x: 1.4,
            y: -0.2,
            button: MouseButton::Primary,
        });
        let decoded = decode_event(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(decoded.pointer(), Some((1.0, 0.0)));
    }

    #[test]
    fn test_encode_rejects_nan() {
        let event = RemoteInputEvent::Scroll(ScrollDelta {
            delta_x: f64::NAN,
            delta_y: 0.0,
        });
        assert!(encode_event(&event).is_err());
    }

    #[test]
    fn test_tag_matches_wire_type() {
        let value: serde_json::Value =
            serde_json::from_str(&encode_event(&press_a()).unwrap()).unwrap();
        assert_eq!(value["type"], press_a().tag());
    }

    #[test]
    fn test_normalize_then_denormalize_scales_between_resolutions() {
        // Arrange: the host streams 1920×1080; the client views it at 960×540.
        let client_view = FrameSize::new(960, 540);
        let host_screen = FrameSize::new(1920, 1080);

        // Act: the client clicks the centre of its view.
        let (nx, ny) = client_view.normalize(480.0, 270.0);
        let (px, py) = host_screen.denormalize(nx, ny);

        // Assert
        assert_eq!((nx, ny), (0.5, 0.5));
        assert_eq!((px, py), (960, 540));
    }

    #[test]
    fn test_denormalize_rounds_to_nearest_pixel() {
        let view = FrameSize::new(1000, 1000);
        assert_eq!(view.denormalize(0.12345, 0.99999), (123, 1000));
    }

    #[test]
    fn test_pixel_events_are_normalized_against_sender_frame() {
        // Arrange: a click at the centre of a 1280x720 video element.
        let frame = FrameSize::new(1280, 720);
        let click = RemoteInputEvent::MouseClick(PointerButton {
            x: 640.0,
            y: 360.0,
            button: MouseButton::Secondary,
        });

        // Act
        let normalized = click.normalized_in(&frame);

        // Assert
        assert_eq!(
            normalized,
            RemoteInputEvent::MouseClick(PointerButton {
                x: 0.5,
                y: 0.5,
                button: MouseButton::Secondary,
            })
        );
    }

    #[test]
    fn test_normalized_in_clamps_and_ignores_non_pointer_events() {
        let frame = FrameSize::new(100, 100);
        let outside = RemoteInputEvent::MouseMove(PointerPosition { x: 150.0, y: -5.0 });
        assert_eq!(
            outside.normalized_in(&frame),
            RemoteInputEvent::MouseMove(PointerPosition { x: 1.0, y: 0.0 })
        );
        let scroll = RemoteInputEvent::Scroll(ScrollDelta {
            delta_x: 0.0,
            delta_y: 120.0,
        });
        assert_eq!(scroll.clone().normalized_in(&frame), scroll);
    }

    #[test]
    fn test_normalize_zero_sized_frame_is_origin() {
        assert_eq!(FrameSize::new(0, 720).normalize(10.0, 10.0), (0.0, 0.0));
    }
}
