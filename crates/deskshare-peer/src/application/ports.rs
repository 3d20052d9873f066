//! Traits the application layer depends on, implemented in `infrastructure`.
//!
//! ```text
//!                       ┌─────────────────── application ───────────────────┐
//! REST API  ◄── SessionDirectory                                            │
//! WebSocket ◄── SignalingConnector ──► SignalingLink (mpsc in/out)          │
//! WebRTC    ◄── TransportFactory   ──► PeerTransport + TransportEvent rx    │
//! Screen    ◄── CaptureSource      ──► frames into a FrameSink              │
//!                       └───────────────────────────────────────────────────┘
//! ```
//!
//! Every trait has a recording double in `infrastructure::mock`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskshare_core::{
    ClientMessage, IceCandidate, IceServer, ServerMessage, SessionCode, SessionError,
    SessionStatus,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

// ── Session directory (REST) ──────────────────────────────────────────────────

/// Body of a successful `POST /api/session`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: Uuid,
    #[serde(rename = "sessionCode")]
    pub code: SessionCode,
    pub expires_at: DateTime<Utc>,
}

/// Body of a successful `GET /api/session/{code}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
    pub has_host: bool,
    pub has_client: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The server answered with a session-level failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server could not be reached or answered nonsense.
    #[error("session service unavailable: {0}")]
    Unavailable(String),
}

impl From<DirectoryError> for SessionError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Session(e) => e,
            DirectoryError::Unavailable(msg) => SessionError::TransportFailure(msg),
        }
    }
}

#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn create_session(&self) -> Result<CreatedSession, DirectoryError>;

    async fn lookup_session(&self, code: &SessionCode) -> Result<SessionInfo, DirectoryError>;
}

// ── Signaling ─────────────────────────────────────────────────────────────────

/// An open signaling connection.
///
/// Dropping `outbound` closes the connection; `inbound` yields `None` once
/// the server has gone away.
#[derive(Debug)]
pub struct SignalingLink {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<ServerMessage>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("signaling server unreachable: {0}")]
    Unreachable(String),

    #[error("signaling connect timed out after {0:?}")]
    Timeout(Duration),
}

impl From<SignalingError> for SessionError {
    fn from(err: SignalingError) -> Self {
        SessionError::TransportFailure(err.to_string())
    }
}

#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(&self) -> Result<SignalingLink, SignalingError>;
}

// ── Peer transport ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer connection setup failed: {0}")]
    Setup(String),

    #[error("session description rejected: {0}")]
    Description(String),

    #[error("ICE candidate rejected: {0}")]
    Candidate(String),

    #[error("control channel unavailable: {0}")]
    Channel(String),

    #[error("media track error: {0}")]
    Media(String),
}

/// Aggregated connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    /// May recover on its own; not treated as a failure.
    Disconnected,
    Failed,
    Closed,
}

/// Everything a transport reports after creation, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    StateChanged(TransportState),
    /// The `control` channel is open in both directions.
    ControlOpen,
    ControlMessage(String),
    RemoteTrack { kind: String, id: String },
}

/// One encoded video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub duration: Duration,
}

#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn write_frame(&self, frame: EncodedFrame) -> Result<(), TransportError>;
}

/// One peer connection attempt.
///
/// A transport is never reused after [`PeerTransport::close`]; restarts ask
/// the [`TransportFactory`] for a fresh one.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Creates the ordered, reliable `control` channel.  Offerer only; the
    /// answerer adopts the channel the remote side announces.
    async fn create_control_channel(&self) -> Result<(), TransportError>;

    /// Adds the outgoing video track and returns where to write its frames.
    async fn add_video_track(&self) -> Result<Arc<dyn FrameSink>, TransportError>;

    /// Creates an offer, sets it as local description, returns its SDP.
    async fn create_offer(&self) -> Result<String, TransportError>;

    /// Applies a remote offer, then creates and sets the local answer.
    async fn accept_offer(&self, sdp: &str) -> Result<String, TransportError>;

    async fn accept_answer(&self, sdp: &str) -> Result<(), TransportError>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn send_control(&self, text: &str) -> Result<(), TransportError>;

    async fn close(&self);
}

/// A transport together with the stream of its events.
pub struct TransportSetup {
    pub transport: Arc<dyn PeerTransport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, ice_servers: &[IceServer]) -> Result<TransportSetup, TransportError>;
}

// ── Screen capture ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("capture source unavailable: {0}")]
    Unavailable(String),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => SessionError::CapturePermissionDenied,
            other => SessionError::TransportFailure(other.to_string()),
        }
    }
}

/// A source of encoded frames, typically the host's screen.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Starts pushing frames into `sink`.
    ///
    /// The returned receiver turns `true` (or its sender is dropped) when the
    /// source stops on its own, e.g. the user ended the share.
    async fn start(&self, sink: Arc<dyn FrameSink>) -> Result<watch::Receiver<bool>, CaptureError>;

    /// Stops the capture.  Calling it when nothing runs is a no-op.
    async fn stop(&self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
