//! Screen source that replays a pre-encoded VP8 IVF file.
//!
//! Real screen grabbing and encoding are platform-specific; this source lets
//! the host run anywhere by streaming a recording instead.  Frames are paced
//! by the file's timebase.  With `looping` the file restarts at its end;
//! otherwise the source ends, which the session treats like the user
//! stopping the share.

use std::io::{self, Cursor};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::media::io::ivf_reader::IVFReader;

use crate::application::ports::{CaptureError, CaptureSource, EncodedFrame, FrameSink};

/// Used when the header's timebase is unusable.
const FALLBACK_FRAME_DURATION: Duration = Duration::from_millis(33);

fn capture_error_from_io(path: &std::path::Path, err: io::Error) -> CaptureError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
        _ => CaptureError::Unavailable(format!("{}: {err}", path.display())),
    }
}

pub struct IvfFileCapture {
    path: PathBuf,
    looping: bool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IvfFileCapture {
    pub fn new(path: impl Into<PathBuf>, looping: bool) -> Self {
        Self {
            path: path.into(),
            looping,
            task: Mutex::new(None),
        }
    }

    fn abort_running(&self) -> bool {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

/// Frame duration from an IVF timebase (seconds per tick).
fn frame_duration(numerator: u32, denominator: u32) -> Duration {
    if numerator == 0 || denominator == 0 {
        return FALLBACK_FRAME_DURATION;
    }
    Duration::from_secs_f64(f64::from(numerator) / f64::from(denominator))
}

async fn replay(
    bytes: Arc<Vec<u8>>,
    looping: bool,
    sink: Arc<dyn FrameSink>,
    ended: watch::Sender<bool>,
) {
    loop {
        let (mut reader, header) = match IVFReader::new(Cursor::new(bytes.as_slice())) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("IVF header unreadable: {e}");
                break;
            }
        };
        let duration = frame_duration(header.timebase_numerator, header.timebase_denominator);
        let mut ticker = tokio::time::interval(duration);
        let mut sent: u64 = 0;

        while let Ok((frame, _frame_header)) = reader.parse_next_frame() {
            ticker.tick().await;
            let frame = EncodedFrame {
                data: frame.to_vec(),
                duration,
            };
            if let Err(e) = sink.write_frame(frame).await {
                debug!("frame dropped: {e}");
            }
            sent += 1;
        }
        debug!("IVF pass finished after {sent} frame(s)");

        if !looping || sent == 0 {
            break;
        }
    }
    info!("capture source ended");
    ended.send_replace(true);
}

#[async_trait]
impl CaptureSource for IvfFileCapture {
    async fn start(&self, sink: Arc<dyn FrameSink>) -> Result<watch::Receiver<bool>, CaptureError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| capture_error_from_io(&self.path, e))?;

        // Validate the header up front so a bad file fails the start.
        let (_, header) = IVFReader::new(Cursor::new(bytes.as_slice()))
            .map_err(|e| CaptureError::Unavailable(format!("{}: {e}", self.path.display())))?;
        if &header.four_cc != b"VP80" {
            warn!(
                "{} is {}, not VP8; the browser may not decode it",
                self.path.display(),
                String::from_utf8_lossy(&header.four_cc)
            );
        }
        info!(
            "capturing from {} ({}x{}, looping: {})",
            self.path.display(),
            header.width,
            header.height,
            self.looping
        );

        self.abort_running();
        let (ended_tx, ended_rx) = watch::channel(false);
        let task = tokio::spawn(replay(Arc::new(bytes), self.looping, sink, ended_tx));
        *self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);
        Ok(ended_rx)
    }

    async fn stop(&self) {
        if self.abort_running() {
            info!("capture stopped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
