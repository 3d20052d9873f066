//! RemoteInputUseCase: applies control-channel events on the host.
//!
//! The client sends pointer positions normalized to its video frame.  This
//! use case decodes each control message, maps the position onto the host's
//! local viewport with [`FrameSize::denormalize`], and hands the result to an
//! [`InputSink`] implementation from the infrastructure layer.
//!
//! The mapping is intentionally lossy: `round(x * width)` on a viewport that
//! need not match the sender's frame.

use std::sync::Arc;

use deskshare_core::protocol::control::{
    decode_or_drop, KeyPress, KeyRelease, MouseButton, PointerButton, PointerPosition, ScrollDelta,
};
use deskshare_core::{FrameSize, RemoteInputEvent};
use thiserror::Error;
use tracing::debug;

/// Error type for input injection.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input sink error: {0}")]
    Sink(String),
}

/// What happened to a mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Press,
    Release,
    /// Press and release in one event.
    Click,
}

/// Modifier keys held during a key press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

/// Where decoded remote input ends up.
///
/// Pointer coordinates are already in local viewport pixels.
pub trait InputSink: Send + Sync {
    fn pointer_move(&self, x: i32, y: i32) -> Result<(), InputError>;

    fn pointer_button(
        &self,
        button: MouseButton,
        action: ButtonAction,
        x: i32,
        y: i32,
    ) -> Result<(), InputError>;

    /// `key` is the produced character or key name, `code` the physical key.
    fn key(
        &self,
        key: &str,
        code: &str,
        modifiers: Modifiers,
        pressed: bool,
    ) -> Result<(), InputError>;

    fn scroll(&self, delta_x: f64, delta_y: f64) -> Result<(), InputError>;
}

/// Drops a pointer move that lands on the same pixel as the previous one.
#[derive(Default)]
struct DedupFilter {
    last_pointer: Option<(i32, i32)>,
}

impl DedupFilter {
    fn should_send_pointer_move(&mut self, x: i32, y: i32) -> bool {
        if self.last_pointer == Some((x, y)) {
            return false;
        }
        self.last_pointer = Some((x, y));
        true
    }

    fn reset(&mut self) {
        self.last_pointer = None;
    }
}

pub struct RemoteInputUseCase {
    sink: Arc<dyn InputSink>,
    viewport: FrameSize,
    dedup: DedupFilter,
}

impl RemoteInputUseCase {
    pub fn new(sink: Arc<dyn InputSink>, viewport: FrameSize) -> Self {
        Self {
            sink,
            viewport,
            dedup: DedupFilter::default(),
        }
    }

    /// Decodes one control message and applies it.
    ///
    /// Undecodable messages are logged and dropped; they never end the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the sink rejects the event.
    pub fn handle_message(&mut self, text: &str) -> Result<(), InputError> {
        match decode_or_drop(text) {
            Some(event) => self.handle_event(&event),
            None => Ok(()),
        }
    }

    /// Applies one decoded event.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the sink rejects the event.
    pub fn handle_event(&mut self, event: &RemoteInputEvent) -> Result<(), InputError> {
        debug!("applying remote {} event", event.tag());
        match event {
            RemoteInputEvent::MouseMove(p) => self.handle_pointer_move(p),
            RemoteInputEvent::MouseClick(b) => self.handle_button(b, ButtonAction::Click),
            RemoteInputEvent::MouseDown(b) => self.handle_button(b, ButtonAction::Press),
            RemoteInputEvent::MouseUp(b) => self.handle_button(b, ButtonAction::Release),
            RemoteInputEvent::KeyPress(k) => self.handle_key_press(k),
            RemoteInputEvent::KeyRelease(k) => self.handle_key_release(k),
            RemoteInputEvent::Scroll(s) => self.handle_scroll(s),
        }
    }

    fn handle_pointer_move(&mut self, p: &PointerPosition) -> Result<(), InputError> {
        let (x, y) = self.viewport.denormalize(p.x, p.y);
        if self.dedup.should_send_pointer_move(x, y) {
            self.sink.pointer_move(x, y)?;
        }
        Ok(())
    }

    fn handle_button(&mut self, b: &PointerButton, action: ButtonAction) -> Result<(), InputError> {
        let (x, y) = self.viewport.denormalize(b.x, b.y);
        self.sink.pointer_button(b.button, action, x, y)
    }

    fn handle_key_press(&self, k: &KeyPress) -> Result<(), InputError> {
        let modifiers = Modifiers {
            ctrl: k.ctrl_key,
            alt: k.alt_key,
            shift: k.shift_key,
            meta: k.meta_key,
        };
        self.sink.key(&k.key, &k.code, modifiers, true)
    }

    fn handle_key_release(&self, k: &KeyRelease) -> Result<(), InputError> {
        self.sink.key(&k.key, &k.code, Modifiers::default(), false)
    }

    fn handle_scroll(&self, s: &ScrollDelta) -> Result<(), InputError> {
        self.sink.scroll(s.delta_x, s.delta_y)
    }

    /// Forgets the last pointer position (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.dedup.reset();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{InputCall, RecordingInputSink};
    use deskshare_core::protocol::control::encode_event;

    fn make_use_case() -> (RemoteInputUseCase, Arc<RecordingInputSink>) {
        let sink = Arc::new(RecordingInputSink::new());
        let uc = RemoteInputUseCase::new(
            Arc::clone(&sink) as Arc<dyn InputSink>,
            FrameSize::new(1920, 1080),
        );
        (uc, sink)
    }

    fn wire(event: &RemoteInputEvent) -> String {
        encode_event(event).unwrap()
    }

    // ── Pointer ───────────────────────────────────────────────────────────────

    #[test]
    fn test_pointer_move_is_denormalized_to_viewport() {
        // Arrange
        let (mut uc, sink) = make_use_case();
        let event = RemoteInputEvent::MouseMove(PointerPosition { x: 0.5, y: 0.25 });

        // Act
        uc.handle_message(&wire(&event)).unwrap();

        // Assert
        assert_eq!(sink.calls(), vec![InputCall::Move(960, 270)]);
    }

    #[test]
    fn test_pointer_move_deduplicates_same_pixel() {
        // Arrange
        let (mut uc, sink) = make_use_case();
        let event = RemoteInputEvent::MouseMove(PointerPosition { x: 0.1, y: 0.1 });

        // Act: same position twice
        uc.handle_event(&event).unwrap();
        uc.handle_event(&event).unwrap();

        // Assert: one injection
        assert_eq!(sink.calls().len(), 1);
    }

    #[test]
    fn test_reset_clears_dedup_state() {
        let (mut uc, sink) = make_use_case();
        let event = RemoteInputEvent::MouseMove(PointerPosition { x: 0.1, y: 0.1 });
        uc.handle_event(&event).unwrap();

        uc.reset();
        uc.handle_event(&event).unwrap();

        assert_eq!(sink.calls().len(), 2);
    }

    #[test]
    fn test_mouse_down_and_up_map_to_press_and_release() {
        // Arrange
        let (mut uc, sink) = make_use_case();
        let at = |button| PointerButton {
            x: 1.0,
            y: 0.0,
            button,
        };

        // Act
        uc.handle_event(&RemoteInputEvent::MouseDown(at(MouseButton::Secondary)))
            .unwrap();
        uc.handle_event(&RemoteInputEvent::MouseUp(at(MouseButton::Secondary)))
            .unwrap();
        uc.handle_event(&RemoteInputEvent::MouseClick(at(MouseButton::Primary)))
            .unwrap();

        // Assert
        assert_eq!(
            sink.calls(),
            vec![
                InputCall::Button(MouseButton::Secondary, ButtonAction::Press, 1920, 0),
                InputCall::Button(MouseButton::Secondary, ButtonAction::Release, 1920, 0),
                InputCall::Button(MouseButton::Primary, ButtonAction::Click, 1920, 0),
            ]
        );
    }

    // ── Keys and scroll ───────────────────────────────────────────────────────

    #[test]
    fn test_key_press_carries_modifiers() {
        let (mut uc, sink) = make_use_case();
        let event = RemoteInputEvent::KeyPress(KeyPress {
            key: "c".into(),
            code: "KeyC".into(),
            ctrl_key: true,
            alt_key: false,
            shift_key: false,
            meta_key: false,
        });

        uc.handle_event(&event).unwrap();

        assert_eq!(
            sink.calls(),
            vec![InputCall::Key {
                key: "c".into(),
                code: "KeyC".into(),
                modifiers: Modifiers {
                    ctrl: true,
                    ..Modifiers::default()
                },
                pressed: true,
            }]
        );
    }

    #[test]
    fn test_key_release_has_no_modifiers() {
        let (mut uc, sink) = make_use_case();

        uc.handle_event(&RemoteInputEvent::KeyRelease(KeyRelease {
            key: "Enter".into(),
            code: "Enter".into(),
        }))
        .unwrap();

        assert!(matches!(
            sink.calls().as_slice(),
            [InputCall::Key { pressed: false, modifiers, .. }] if *modifiers == Modifiers::default()
        ));
    }

    #[test]
    fn test_scroll_passes_deltas_through() {
        let (mut uc, sink) = make_use_case();

        uc.handle_event(&RemoteInputEvent::Scroll(ScrollDelta {
            delta_x: 0.0,
            delta_y: -120.0,
        }))
        .unwrap();

        assert_eq!(sink.calls(), vec![InputCall::Scroll(0.0, -120.0)]);
    }

    // ── Bad input ─────────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_tag_is_dropped_without_error() {
        let (mut uc, sink) = make_use_case();

        let result = uc.handle_message(r#"{"type":"clipboard","payload":{}}"#);

        assert!(result.is_ok());
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn test_garbage_is_dropped_without_error() {
        let (mut uc, sink) = make_use_case();
        assert!(uc.handle_message("not json").is_ok());
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn test_sink_failure_is_reported() {
        // Arrange
        let sink = Arc::new(RecordingInputSink::failing());
        let mut uc = RemoteInputUseCase::new(sink, FrameSize::new(100, 100));

        // Act
        let result = uc.handle_event(&RemoteInputEvent::Scroll(ScrollDelta {
            delta_x: 1.0,
            delta_y: 1.0,
        }));

        // Assert
        assert!(result.is_err());
    }
}
