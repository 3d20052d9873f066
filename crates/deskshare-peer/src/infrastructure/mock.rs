//! Recording test doubles for every application port.
//!
//! # Why recording doubles?
//!
//! The real adapters open sockets, negotiate DTLS, or read media files.  The
//! doubles here replace all of that with in-memory recording: each call is
//! pushed into a `Mutex<Vec<...>>` so assertions can inspect exactly what
//! happened and in what order.
//!
//! # Usage in tests
//!
//! ```ignore
//! let factory = Arc::new(MockTransportFactory::new());
//! let mut negotiator = Negotiator::new(Role::Host, me, cfg, factory.clone(), vec![], tx);
//!
//! negotiator.peer_joined(client).await.unwrap();
//!
//! let transport = factory.last().unwrap();
//! assert_eq!(transport.calls()[0], TransportCall::AddVideoTrack);
//! transport.emit(TransportEvent::StateChanged(TransportState::Connected));
//! ```
//!
//! # Failure switches
//!
//! Most doubles carry a switch (`failing()`, `fail_next()`, `fail_lookups()`)
//! that makes the next call return an error, so error paths can be tested
//! without a broken network.  `hold()` parks the next calls until
//! `release()`, so a test can act while the lifecycle is mid-step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deskshare_core::protocol::control::MouseButton;
use deskshare_core::{
    ClientMessage, IceCandidate, IceServer, ParticipantId, Role, ServerMessage, SessionCode,
    SessionError, SessionStatus,
};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::application::ports::{
    CaptureError, CaptureSource, CreatedSession, DirectoryError, EncodedFrame, FrameSink,
    PeerTransport, SessionDirectory, SessionInfo, SignalingConnector, SignalingError,
    SignalingLink, TransportError, TransportEvent, TransportFactory, TransportSetup,
};
use crate::application::remote_input::{ButtonAction, InputError, InputSink, Modifiers};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Open unless a test holds it.
struct Gate(watch::Sender<bool>);

impl Default for Gate {
    fn default() -> Self {
        Self(watch::channel(true).0)
    }
}

impl Gate {
    fn hold(&self) {
        self.0.send_replace(false);
    }

    fn release(&self) {
        self.0.send_replace(true);
    }

    async fn pass(&self) {
        let mut open = self.0.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

// ── Input ─────────────────────────────────────────────────────────────────────

/// One call received by [`RecordingInputSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum InputCall {
    Move(i32, i32),
    Button(MouseButton, ButtonAction, i32, i32),
    Key {
        key: String,
        code: String,
        modifiers: Modifiers,
        pressed: bool,
    },
    Scroll(f64, f64),
}

#[derive(Default)]
pub struct RecordingInputSink {
    calls: Mutex<Vec<InputCall>>,
    should_fail: bool,
}

impl RecordingInputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<InputCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: InputCall) -> Result<(), InputError> {
        if self.should_fail {
            return Err(InputError::Sink("mock failure".into()));
        }
        lock(&self.calls).push(call);
        Ok(())
    }
}

impl InputSink for RecordingInputSink {
    fn pointer_move(&self, x: i32, y: i32) -> Result<(), InputError> {
        self.record(InputCall::Move(x, y))
    }

    fn pointer_button(
        &self,
        button: MouseButton,
        action: ButtonAction,
        x: i32,
        y: i32,
    ) -> Result<(), InputError> {
        self.record(InputCall::Button(button, action, x, y))
    }

    fn key(
        &self,
        key: &str,
        code: &str,
        modifiers: Modifiers,
        pressed: bool,
    ) -> Result<(), InputError> {
        self.record(InputCall::Key {
            key: key.to_string(),
            code: code.to_string(),
            modifiers,
            pressed,
        })
    }

    fn scroll(&self, delta_x: f64, delta_y: f64) -> Result<(), InputError> {
        self.record(InputCall::Scroll(delta_x, delta_y))
    }
}

// ── Media ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingFrameSink {
    frames: Mutex<Vec<EncodedFrame>>,
}

impl RecordingFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<EncodedFrame> {
        lock(&self.frames).clone()
    }
}

#[async_trait]
impl FrameSink for RecordingFrameSink {
    async fn write_frame(&self, frame: EncodedFrame) -> Result<(), TransportError> {
        lock(&self.frames).push(frame);
        Ok(())
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// One call received by a [`MockTransport`].  `close` is tracked separately
/// through [`MockTransport::is_closed`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    CreateControlChannel,
    AddVideoTrack,
    CreateOffer,
    AcceptOffer(String),
    AcceptAnswer(String),
    AddRemoteCandidate(IceCandidate),
    SendControl(String),
}

pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    closed: AtomicBool,
    events: mpsc::Sender<TransportEvent>,
    video: Arc<RecordingFrameSink>,
    ice_servers: Vec<IceServer>,
}

impl MockTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Injects an event as if the underlying connection reported it.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.try_send(event);
    }

    /// Control messages sent so far, in order.
    pub fn sent_control(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::SendControl(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Frames written to the video track.
    pub fn video(&self) -> Arc<RecordingFrameSink> {
        Arc::clone(&self.video)
    }

    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    fn record(&self, call: TransportCall) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Setup("transport closed".into()));
        }
        lock(&self.calls).push(call);
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_control_channel(&self) -> Result<(), TransportError> {
        self.record(TransportCall::CreateControlChannel)
    }

    async fn add_video_track(&self) -> Result<Arc<dyn FrameSink>, TransportError> {
        self.record(TransportCall::AddVideoTrack)?;
        Ok(self.video.clone())
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        self.record(TransportCall::CreateOffer)?;
        Ok("v=0 mock-offer".to_string())
    }

    async fn accept_offer(&self, sdp: &str) -> Result<String, TransportError> {
        self.record(TransportCall::AcceptOffer(sdp.to_string()))?;
        Ok("v=0 mock-answer".to_string())
    }

    async fn accept_answer(&self, sdp: &str) -> Result<(), TransportError> {
        self.record(TransportCall::AcceptAnswer(sdp.to_string()))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.record(TransportCall::AddRemoteCandidate(candidate))
    }

    async fn send_control(&self, text: &str) -> Result<(), TransportError> {
        self.record(TransportCall::SendControl(text.to_string()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out a fresh [`MockTransport`] per call and keeps every one of them.
#[derive(Default)]
pub struct MockTransportFactory {
    transports: Mutex<Vec<Arc<MockTransport>>>,
    fail_next: AtomicBool,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create` fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        lock(&self.transports).len()
    }

    pub fn last(&self) -> Option<Arc<MockTransport>> {
        lock(&self.transports).last().cloned()
    }

    pub fn all(&self) -> Vec<Arc<MockTransport>> {
        lock(&self.transports).clone()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(&self, ice_servers: &[IceServer]) -> Result<TransportSetup, TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Setup("mock failure".into()));
        }
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(MockTransport {
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            events: tx,
            video: Arc::new(RecordingFrameSink::new()),
            ice_servers: ice_servers.to_vec(),
        });
        lock(&self.transports).push(Arc::clone(&transport));
        Ok(TransportSetup {
            transport,
            events: rx,
        })
    }
}

// ── Directory ─────────────────────────────────────────────────────────────────

/// An in-memory session directory.
///
/// Unknown codes are `NotFound`; [`MockDirectory::expire`] turns a known code
/// into `Expired`.
#[derive(Default)]
pub struct MockDirectory {
    sessions: Mutex<HashMap<SessionCode, bool>>,
    lookup_error: Mutex<Option<DirectoryError>>,
    created: AtomicUsize,
    lookups: AtomicUsize,
    gate: Gate,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing, live session.
    pub fn with_session(self, code: &str) -> Self {
        if let Ok(code) = SessionCode::parse(code) {
            lock(&self.sessions).insert(code, true);
        }
        self
    }

    pub fn expire(&self, code: &SessionCode) {
        lock(&self.sessions).insert(code.clone(), false);
    }

    /// Makes every later lookup fail with `err`.
    pub fn fail_lookups(&self, err: DirectoryError) {
        *lock(&self.lookup_error) = Some(err);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Parks every later create and lookup until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.hold();
    }

    pub fn release(&self) {
        self.gate.release();
    }
}

#[async_trait]
impl SessionDirectory for MockDirectory {
    async fn create_session(&self) -> Result<CreatedSession, DirectoryError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        let suffix = deskshare_core::domain::code::SAFE_ALPHABET[n % 32] as char;
        let code = SessionCode::parse(&format!("HSTAB{suffix}"))?;
        lock(&self.sessions).insert(code.clone(), true);
        Ok(CreatedSession {
            session_id: Uuid::new_v4(),
            code,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }

    async fn lookup_session(&self, code: &SessionCode) -> Result<SessionInfo, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if let Some(err) = lock(&self.lookup_error).clone() {
            return Err(err);
        }
        match lock(&self.sessions).get(code) {
            None => Err(SessionError::NotFound.into()),
            Some(false) => Err(SessionError::Expired.into()),
            Some(true) => Ok(SessionInfo {
                session_id: Uuid::new_v4(),
                status: SessionStatus::Active,
                expires_at: Utc::now() + chrono::Duration::hours(1),
                has_host: true,
                has_client: false,
            }),
        }
    }
}

// ── Signaling ─────────────────────────────────────────────────────────────────

/// The server side of one connection made through [`MockSignalingConnector`].
pub struct FakeServerEnd {
    pub from_peer: mpsc::Receiver<ClientMessage>,
    pub to_peer: mpsc::Sender<ServerMessage>,
}

impl FakeServerEnd {
    /// Waits for the next message from the peer.
    ///
    /// # Panics
    ///
    /// If the peer closes the connection or nothing arrives within 5 s.
    pub async fn expect(&mut self) -> ClientMessage {
        tokio::time::timeout(Duration::from_secs(5), self.from_peer.recv())
            .await
            .expect("timed out waiting for a peer message")
            .expect("peer closed signaling")
    }

    /// Answers the peer's join request and returns its assigned identity.
    ///
    /// # Panics
    ///
    /// If the next message is not `join-session`.
    pub async fn accept_join(&mut self, ice_servers: Vec<IceServer>) -> (ParticipantId, Role) {
        let ClientMessage::JoinSession { session_code, role } = self.expect().await else {
            panic!("expected join-session");
        };
        let peer_id = ParticipantId::new();
        self.send(ServerMessage::SessionJoined {
            peer_id,
            session_code,
            role,
            ice_servers,
        })
        .await;
        (peer_id, role)
    }

    pub async fn send(&self, msg: ServerMessage) {
        let _ = self.to_peer.send(msg).await;
    }
}

/// Connects to an in-process fake server.  Each `connect` produces one
/// [`FakeServerEnd`], collected with [`MockSignalingConnector::accept`].
pub struct MockSignalingConnector {
    accepted_tx: mpsc::UnboundedSender<FakeServerEnd>,
    accepted_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeServerEnd>>,
    unreachable: AtomicBool,
    attempts: AtomicUsize,
    gate: Gate,
}

impl Default for MockSignalingConnector {
    fn default() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            accepted_tx,
            accepted_rx: tokio::sync::Mutex::new(accepted_rx),
            unreachable: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            gate: Gate::default(),
        }
    }
}

impl MockSignalingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `connect` fail.
    pub fn unreachable(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }

    /// Number of `connect` calls so far, finished or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Parks every later `connect` until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.hold();
    }

    pub fn release(&self) {
        self.gate.release();
    }

    /// Waits for the peer's next connection.
    ///
    /// # Panics
    ///
    /// If no connection is made within 5 s.
    pub async fn accept(&self) -> FakeServerEnd {
        let mut rx = self.accepted_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a signaling connection")
            .expect("connector dropped")
    }
}

#[async_trait]
impl SignalingConnector for MockSignalingConnector {
    async fn connect(&self) -> Result<SignalingLink, SignalingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SignalingError::Unreachable("mock connection refused".into()));
        }
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let _ = self.accepted_tx.send(FakeServerEnd {
            from_peer: out_rx,
            to_peer: in_tx,
        });
        Ok(SignalingLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

/// A capture source driven by the test: frames are pushed by hand and the
/// source ends when [`MockCapture::end`] is called.
pub struct MockCapture {
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    ended: watch::Sender<bool>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_with: Mutex<Option<CaptureError>>,
    gate: Gate,
}

impl Default for MockCapture {
    fn default() -> Self {
        Self {
            sink: Mutex::new(None),
            ended: watch::channel(false).0,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            gate: Gate::default(),
        }
    }
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `start` fails as if the user refused the prompt.
    pub fn denied() -> Self {
        let capture = Self::default();
        *lock(&capture.fail_with) = Some(CaptureError::PermissionDenied);
        capture
    }

    /// Writes one frame into whatever sink `start` received.
    pub async fn push_frame(&self, frame: EncodedFrame) {
        let sink = lock(&self.sink).clone();
        if let Some(sink) = sink {
            let _ = sink.write_frame(frame).await;
        }
    }

    /// Ends the source as if the user stopped sharing.
    pub fn end(&self) {
        self.ended.send_replace(true);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Parks every later `start` until [`release`](Self::release).  A parked
    /// start already counts in [`starts`](Self::starts).
    pub fn hold(&self) {
        self.gate.hold();
    }

    pub fn release(&self) {
        self.gate.release();
    }
}

#[async_trait]
impl CaptureSource for MockCapture {
    async fn start(&self, sink: Arc<dyn FrameSink>) -> Result<watch::Receiver<bool>, CaptureError> {
        if let Some(err) = lock(&self.fail_with).clone() {
            return Err(err);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        *lock(&self.sink) = Some(sink);
        self.ended.send_replace(false);
        Ok(self.ended.subscribe())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *lock(&self.sink) = None;
    }
}
