//! Input sink that records remote input in the log instead of injecting it.
//!
//! Injecting into the host's desktop needs OS-specific APIs and permissions.
//! This sink is what the peer binary ships with; it makes every applied
//! event visible at `info` level under the `remote_input` target.

use deskshare_core::protocol::control::MouseButton;
use tracing::info;

use crate::application::remote_input::{ButtonAction, InputError, InputSink, Modifiers};

#[derive(Debug, Default)]
pub struct LoggingInputSink;

impl LoggingInputSink {
    pub fn new() -> Self {
        Self
    }
}

impl InputSink for LoggingInputSink {
    fn pointer_move(&self, x: i32, y: i32) -> Result<(), InputError> {
        info!(target: "remote_input", x, y, "pointer move");
        Ok(())
    }

    fn pointer_button(
        &self,
        button: MouseButton,
        action: ButtonAction,
        x: i32,
        y: i32,
    ) -> Result<(), InputError> {
        info!(target: "remote_input", ?button, ?action, x, y, "pointer button");
        Ok(())
    }

    fn key(
        &self,
        key: &str,
        code: &str,
        modifiers: Modifiers,
        pressed: bool,
    ) -> Result<(), InputError> {
        info!(target: "remote_input", key, code, ?modifiers, pressed, "key");
        Ok(())
    }

    fn scroll(&self, delta_x: f64, delta_y: f64) -> Result<(), InputError> {
        info!(target: "remote_input", delta_x, delta_y, "scroll");
        Ok(())
    }
}
