//! Routes captured frames to whichever transport is current.
//!
//! The host starts capturing once, right after joining.  Each negotiation
//! attempt brings its own video track, so capture writes into a
//! [`TrackSwitch`] and the lifecycle re-points the switch whenever a
//! transport connects or goes away.  Frames arriving while nothing is
//! attached are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::application::ports::{EncodedFrame, FrameSink, TransportError};

#[derive(Default)]
pub struct TrackSwitch {
    target: RwLock<Option<Arc<dyn FrameSink>>>,
    discarded: AtomicU64,
}

impl TrackSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends every following frame to `sink`.
    pub fn attach(&self, sink: Arc<dyn FrameSink>) {
        *self
            .target
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);
    }

    pub fn detach(&self) {
        *self
            .target
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn is_attached(&self) -> bool {
        self.target
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Frames dropped because no track was attached.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameSink for TrackSwitch {
    async fn write_frame(&self, frame: EncodedFrame) -> Result<(), TransportError> {
        // Clone out of the lock; it must not be held across the write.
        let target = self
            .target
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match target {
            Some(sink) => sink.write_frame(frame).await,
            None => {
                let n = self.discarded.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 300 == 1 {
                    debug!("no video track attached; {n} frame(s) discarded so far");
                }
                Ok(())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::RecordingFrameSink;
    use std::time::Duration;

    fn frame(byte: u8) -> EncodedFrame {
        EncodedFrame {
            data: vec![byte],
            duration: Duration::from_millis(33),
        }
    }

    #[tokio::test]
    async fn test_frames_without_track_are_discarded() {
        let switch = TrackSwitch::new();

        switch.write_frame(frame(1)).await.unwrap();

        assert_eq!(switch.discarded(), 1);
        assert!(!switch.is_attached());
    }

    #[tokio::test]
    async fn test_attached_sink_receives_frames_until_detached() {
        // Arrange
        let switch = TrackSwitch::new();
        let sink = Arc::new(RecordingFrameSink::new());
        switch.attach(sink.clone());

        // Act
        switch.write_frame(frame(1)).await.unwrap();
        switch.detach();
        switch.write_frame(frame(2)).await.unwrap();

        // Assert
        assert_eq!(sink.frames(), vec![frame(1)]);
        assert_eq!(switch.discarded(), 1);
    }

    #[tokio::test]
    async fn test_reattach_switches_to_new_sink() {
        let switch = TrackSwitch::new();
        let first = Arc::new(RecordingFrameSink::new());
        let second = Arc::new(RecordingFrameSink::new());

        switch.attach(first.clone());
        switch.write_frame(frame(1)).await.unwrap();
        switch.attach(second.clone());
        switch.write_frame(frame(2)).await.unwrap();

        assert_eq!(first.frames(), vec![frame(1)]);
        assert_eq!(second.frames(), vec![frame(2)]);
    }
}
