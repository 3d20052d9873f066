//! SessionLifecycle: owns one peer's session from creation to teardown.
//!
//! The lifecycle runs as a single task.  Callers talk to it through a
//! [`LifecycleHandle`]: commands go in over an `mpsc` channel, the current
//! [`LifecycleState`] and session code come back over `watch` channels.
//!
//! # Flow
//!
//! ```text
//! Host:   create (REST) ─► connect signaling ─► join ─► start capture ─► Waiting
//!         peer-joined ─► offer ─► … ─► Connected ─► attach track ─► Streaming
//!
//! Client: lookup (REST) ─► connect signaling ─► join ─► Connecting
//!         offer ─► answer ─► … ─► Connected ─► remote video ─► Streaming
//! ```
//!
//! # Failure handling
//!
//! - `session-expired`, an unknown code, or a role conflict end the session:
//!   the state becomes `Error(cause)` until [`LifecycleHandle::reset`].
//! - A failed or timed-out handshake restarts with bounded exponential
//!   backoff.  Each restart first checks over REST that the session still
//!   exists.  Once the restart budget is spent the last cause is fatal.
//! - The host's capture ending on its own disconnects the session.
//!
//! # Cancellation
//!
//! Every setup step (REST call, signaling connect, join reply, capture start)
//! and the REST check before a restart is raced against the command channel.
//! A `Disconnect` that wins drops the step, sends `leave-session` if the join
//! was already sent, stops a capture that may have started, and lands in
//! `Disconnected` without passing through `Error`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use deskshare_core::protocol::control::encode_event;
use deskshare_core::{
    ClientMessage, FrameSize, ParticipantId, RemoteInputEvent, Role, ServerMessage, SessionCode,
    SessionError,
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::application::media::TrackSwitch;
use crate::application::negotiation::{NegotiationError, NegotiationEvent, Negotiator};
use crate::application::ports::{
    CaptureError, CaptureSource, DirectoryError, SessionDirectory, SignalingConnector,
    TransportEvent, TransportFactory,
};
use crate::application::remote_input::{InputSink, RemoteInputUseCase};
use crate::domain::{transition, LifecycleEvent, LifecycleState, PeerConfig};

const COMMAND_QUEUE: usize = 64;

// ── Handle ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleCommand {
    /// Create a new session and host it.
    Host,
    /// Join the session with this code as the client.
    Join(String),
    /// Send one input event to the host (client only).
    SendInput(RemoteInputEvent),
    Disconnect,
    /// Leave the `Error` state.
    Reset,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("session lifecycle task has stopped")]
    Stopped,
}

/// Cloneable front end of a running [`SessionLifecycle`].
#[derive(Clone)]
pub struct LifecycleHandle {
    commands: mpsc::Sender<LifecycleCommand>,
    state: watch::Receiver<LifecycleState>,
    code: watch::Receiver<Option<SessionCode>>,
}

impl LifecycleHandle {
    pub async fn host(&self) -> Result<(), LifecycleError> {
        self.send(LifecycleCommand::Host).await
    }

    pub async fn join(&self, code: impl Into<String>) -> Result<(), LifecycleError> {
        self.send(LifecycleCommand::Join(code.into())).await
    }

    /// Sends an event whose pointer coordinates are already in `[0, 1]`.
    pub async fn send_input(&self, event: RemoteInputEvent) -> Result<(), LifecycleError> {
        self.send(LifecycleCommand::SendInput(event)).await
    }

    /// Sends an event whose pointer coordinates are pixels inside `frame`,
    /// the remote video as displayed here.
    pub async fn send_input_in_frame(
        &self,
        frame: FrameSize,
        event: RemoteInputEvent,
    ) -> Result<(), LifecycleError> {
        self.send_input(event.normalized_in(&frame)).await
    }

    pub async fn disconnect(&self) -> Result<(), LifecycleError> {
        self.send(LifecycleCommand::Disconnect).await
    }

    pub async fn reset(&self) -> Result<(), LifecycleError> {
        self.send(LifecycleCommand::Reset).await
    }

    pub fn state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    /// A receiver that sees every state change from now on.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// The code of the current session, once known.
    pub fn session_code(&self) -> Option<SessionCode> {
        self.code.borrow().clone()
    }

    /// Waits until the state satisfies `pred` and returns it.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Stopped`] if the lifecycle task ends first.
    pub async fn wait_for(
        &self,
        mut pred: impl FnMut(&LifecycleState) -> bool,
    ) -> Result<LifecycleState, LifecycleError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| pred(s))
            .await
            .map_err(|_| LifecycleError::Stopped)?;
        Ok(state.clone())
    }

    async fn send(&self, cmd: LifecycleCommand) -> Result<(), LifecycleError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| LifecycleError::Stopped)
    }
}

// ── Services ──────────────────────────────────────────────────────────────────

/// The adapters one lifecycle talks to.
#[derive(Clone)]
pub struct PeerServices {
    pub directory: Arc<dyn SessionDirectory>,
    pub signaling: Arc<dyn SignalingConnector>,
    pub transports: Arc<dyn TransportFactory>,
    /// Required for hosting; a client never captures.
    pub capture: Option<Arc<dyn CaptureSource>>,
    /// Where the host applies the client's input.
    pub input: Arc<dyn InputSink>,
}

// ── Lifecycle task ────────────────────────────────────────────────────────────

/// Everything that lives exactly as long as one joined session.
struct ActiveSession {
    role: Role,
    code: SessionCode,
    self_id: ParticipantId,
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<ServerMessage>,
    /// Messages that arrived while waiting for `session-joined`.
    backlog: VecDeque<ServerMessage>,
    negotiator: Negotiator,
    capture_ended: Option<watch::Receiver<bool>>,
    input: Option<RemoteInputUseCase>,
    restarts: u32,
    retry_at: Option<Instant>,
}

/// How a running session ended.
enum Ending {
    Disconnected,
    Failed(SessionError),
}

pub struct SessionLifecycle {
    services: PeerServices,
    config: PeerConfig,
    commands: mpsc::Receiver<LifecycleCommand>,
    state: watch::Sender<LifecycleState>,
    code: watch::Sender<Option<SessionCode>>,
    switch: Arc<TrackSwitch>,
}

impl SessionLifecycle {
    pub fn new(services: PeerServices, config: PeerConfig) -> (Self, LifecycleHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(LifecycleState::default());
        let (code_tx, code_rx) = watch::channel(None);
        let lifecycle = Self {
            services,
            config,
            commands: cmd_rx,
            state: state_tx,
            code: code_tx,
            switch: Arc::new(TrackSwitch::new()),
        };
        let handle = LifecycleHandle {
            commands: cmd_tx,
            state: state_rx,
            code: code_rx,
        };
        (lifecycle, handle)
    }

    /// Spawns the lifecycle on the current runtime.
    pub fn spawn(services: PeerServices, config: PeerConfig) -> (LifecycleHandle, JoinHandle<()>) {
        let (lifecycle, handle) = Self::new(services, config);
        (handle, tokio::spawn(lifecycle.run()))
    }

    /// Processes commands until every [`LifecycleHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                LifecycleCommand::Host => self.start(Role::Host, None).await,
                LifecycleCommand::Join(code) => self.start(Role::Client, Some(code)).await,
                LifecycleCommand::SendInput(event) => {
                    debug!("no active session; dropping {} event", event.tag());
                }
                LifecycleCommand::Disconnect => self.apply(LifecycleEvent::Disconnected),
                LifecycleCommand::Reset => self.apply(LifecycleEvent::Reset),
            }
        }
        debug!("all lifecycle handles dropped; stopping");
    }

    fn current(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    fn apply(&self, event: LifecycleEvent) {
        let from = self.current();
        let to = transition(&from, event);
        if to != from {
            info!("session state: {from} -> {to}");
            self.state.send_replace(to);
        }
    }

    async fn start(&mut self, role: Role, code: Option<String>) {
        let state = self.current();
        if state != LifecycleState::Disconnected {
            warn!("cannot start a {role} session while {state}");
            return;
        }

        self.apply(LifecycleEvent::InitRequested);
        let session = match self.establish(role, code).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!("disconnect requested while starting the {role} session");
                self.code.send_replace(None);
                self.apply(LifecycleEvent::Disconnected);
                return;
            }
            Err(cause) => {
                error!("could not start {role} session: {cause}");
                self.code.send_replace(None);
                self.apply(LifecycleEvent::Failed(cause));
                return;
            }
        };

        match self.drive(session).await {
            Ending::Disconnected => self.apply(LifecycleEvent::Disconnected),
            Ending::Failed(cause) => {
                error!("session ended: {cause}");
                self.apply(LifecycleEvent::Failed(cause));
            }
        }
    }

    // ── Setup ─────────────────────────────────────────────────────────────────

    /// Sets up a joined session, or returns `None` if a disconnect arrived
    /// first.
    async fn establish(
        &mut self,
        role: Role,
        raw_code: Option<String>,
    ) -> Result<Option<ActiveSession>, SessionError> {
        let code = match (role, raw_code) {
            (Role::Host, _) => {
                let step = self.services.directory.create_session();
                let Some(created) = until_disconnect(&mut self.commands, step).await else {
                    return Ok(None);
                };
                let created = created?;
                info!("created session {} (expires {})", created.code, created.expires_at);
                created.code
            }
            (Role::Client, raw) => {
                let code = SessionCode::parse(raw.as_deref().unwrap_or_default())?;
                let step = self.services.directory.lookup_session(&code);
                let Some(info) = until_disconnect(&mut self.commands, step).await else {
                    return Ok(None);
                };
                debug!("session {code} is {:?}", info?.status);
                code
            }
        };
        self.code.send_replace(Some(code.clone()));

        let step = self.services.signaling.connect();
        let Some(link) = until_disconnect(&mut self.commands, step).await else {
            return Ok(None);
        };
        let link = link?;
        let (outbound, mut inbound) = (link.outbound, link.inbound);
        self.apply(LifecycleEvent::Initialized);

        outbound
            .send(ClientMessage::JoinSession {
                session_code: code.to_string(),
                role,
            })
            .await
            .map_err(|_| SessionError::TransportFailure("signaling closed".into()))?;

        let mut backlog = VecDeque::new();
        let wait = async {
            loop {
                match inbound.recv().await {
                    Some(ServerMessage::SessionJoined {
                        peer_id,
                        ice_servers,
                        ..
                    }) => return Ok((peer_id, ice_servers)),
                    Some(ServerMessage::SessionError { error }) => {
                        return Err(SessionError::from_server_message(&error))
                    }
                    Some(other) => backlog.push_back(other),
                    None => {
                        return Err(SessionError::TransportFailure(
                            "signaling closed before join completed".into(),
                        ))
                    }
                }
            }
        };
        let request_timeout = self.config.request_timeout;
        let step = timeout(request_timeout, wait);
        let Some(joined) = until_disconnect(&mut self.commands, step).await else {
            leave(&outbound).await;
            return Ok(None);
        };
        let (self_id, ice_servers) = joined.map_err(|_| {
            SessionError::TransportFailure(format!("no join reply within {request_timeout:?}"))
        })??;
        info!("joined session {code} as {role} ({self_id})");

        let (capture_ended, input) = match role {
            Role::Host => {
                let capture = match self.capture_source() {
                    Ok(capture) => capture,
                    Err(e) => {
                        leave(&outbound).await;
                        return Err(e.into());
                    }
                };
                let step = capture.start(self.switch.clone());
                let ended = match until_disconnect(&mut self.commands, step).await {
                    Some(Ok(ended)) => ended,
                    Some(Err(e)) => {
                        leave(&outbound).await;
                        return Err(e.into());
                    }
                    None => {
                        capture.stop().await;
                        leave(&outbound).await;
                        return Ok(None);
                    }
                };
                let input =
                    RemoteInputUseCase::new(Arc::clone(&self.services.input), self.config.viewport);
                (Some(ended), Some(input))
            }
            Role::Client => (None, None),
        };

        let negotiator = Negotiator::new(
            role,
            self_id,
            self.config.negotiation.clone(),
            Arc::clone(&self.services.transports),
            ice_servers,
            outbound.clone(),
        );

        self.apply(LifecycleEvent::Joined(role));
        Ok(Some(ActiveSession {
            role,
            code,
            self_id,
            outbound,
            inbound,
            backlog,
            negotiator,
            capture_ended,
            input,
            restarts: 0,
            retry_at: None,
        }))
    }

    fn capture_source(&self) -> Result<Arc<dyn CaptureSource>, CaptureError> {
        self.services
            .capture
            .clone()
            .ok_or_else(|| CaptureError::Unavailable("no capture source configured".into()))
    }

    // ── Running session ───────────────────────────────────────────────────────

    async fn drive(&mut self, mut session: ActiveSession) -> Ending {
        // Commands queued during setup come before anything the server sent.
        loop {
            match self.commands.try_recv() {
                Ok(LifecycleCommand::Disconnect) | Err(TryRecvError::Disconnected) => {
                    info!("disconnect requested");
                    return self.teardown(session, Ending::Disconnected).await;
                }
                Ok(LifecycleCommand::SendInput(event)) => {
                    debug!("not connected yet; dropping {} event", event.tag());
                }
                Ok(other) => warn!("ignoring {other:?} while a session is active"),
                Err(TryRecvError::Empty) => break,
            }
        }

        while let Some(msg) = session.backlog.pop_front() {
            if let Err(cause) = self.on_server_message(&mut session, msg).await {
                return self.teardown(session, Ending::Failed(cause)).await;
            }
        }

        loop {
            let deadline = session.negotiator.deadline();
            let retry_at = session.retry_at;

            let step = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    None | Some(LifecycleCommand::Disconnect) => {
                        info!("disconnect requested");
                        return self.teardown(session, Ending::Disconnected).await;
                    }
                    Some(LifecycleCommand::SendInput(event)) => {
                        self.forward_input(&session, &event).await;
                        Ok(())
                    }
                    Some(other) => {
                        warn!("ignoring {other:?} while a session is active");
                        Ok(())
                    }
                },
                msg = session.inbound.recv() => match msg {
                    Some(msg) => self.on_server_message(&mut session, msg).await,
                    None => Err(SessionError::TransportFailure(
                        "signaling connection lost".into(),
                    )),
                },
                event = session.negotiator.next_event() => {
                    self.on_transport_event(&mut session, event).await
                }
                _ = sleep_until(deadline) => {
                    let cause = session.negotiator.on_timeout();
                    self.transport_lost(&mut session, cause)
                }
                _ = sleep_until(retry_at) => match self.restart(&mut session).await {
                    Some(step) => step,
                    None => {
                        info!("disconnect requested during restart");
                        return self.teardown(session, Ending::Disconnected).await;
                    }
                },
                _ = capture_finished(&mut session.capture_ended) => {
                    info!("screen capture ended; leaving session");
                    return self.teardown(session, Ending::Disconnected).await;
                }
            };

            if let Err(cause) = step {
                return self.teardown(session, Ending::Failed(cause)).await;
            }
        }
    }

    async fn on_server_message(
        &mut self,
        session: &mut ActiveSession,
        msg: ServerMessage,
    ) -> Result<(), SessionError> {
        debug!("signaling: {}", msg.type_name());
        match msg {
            ServerMessage::PeerJoined { peer_id, role } => {
                if role == session.role {
                    warn!("ignoring peer {peer_id} with our own role {role}");
                    return Ok(());
                }
                info!("{role} {peer_id} joined");
                session.restarts = 0;
                session.retry_at = None;
                self.switch.detach();
                self.apply(LifecycleEvent::PeerArrived);
                if let Err(e) = session.negotiator.peer_joined(peer_id).await {
                    return self.transport_lost(session, e.into());
                }
                Ok(())
            }
            ServerMessage::PeerLeft { peer_id, role } => {
                if session.negotiator.target() != Some(peer_id) {
                    debug!("{role} {peer_id} left; not our peer");
                    return Ok(());
                }
                info!("{role} {peer_id} left");
                session.negotiator.peer_left(peer_id).await;
                session.restarts = 0;
                session.retry_at = None;
                self.peer_gone(session);
                Ok(())
            }
            ServerMessage::SessionExpired { session_code } => {
                warn!("session {session_code} expired");
                Err(SessionError::Expired)
            }
            ServerMessage::SessionError { error } => {
                let cause = SessionError::from_server_message(&error);
                if cause.is_session_fatal() {
                    return Err(cause);
                }
                warn!("server rejected a message: {cause}");
                Ok(())
            }
            ServerMessage::SessionJoined { .. } => {
                debug!("repeated session-joined ignored");
                Ok(())
            }
            relayed => {
                let Some(signal) = relayed.into_negotiation(session.self_id) else {
                    return Ok(());
                };
                match session.negotiator.handle_signal(signal).await {
                    Ok(()) => Ok(()),
                    Err(e) => self.transport_lost(session, e.into()),
                }
            }
        }
    }

    async fn on_transport_event(
        &mut self,
        session: &mut ActiveSession,
        event: TransportEvent,
    ) -> Result<(), SessionError> {
        let outcome = match session.negotiator.handle_transport_event(event).await {
            Ok(outcome) => outcome,
            Err(NegotiationError::SignalingClosed) => {
                return Err(SessionError::TransportFailure("signaling closed".into()))
            }
            Err(e) => return self.transport_lost(session, e.into()),
        };

        match outcome {
            None => {}
            Some(NegotiationEvent::Connected) => {
                session.restarts = 0;
                session.retry_at = None;
                self.apply(LifecycleEvent::TransportConnected);
                if session.role == Role::Host {
                    if let Some(track) = session.negotiator.media_sink() {
                        self.switch.attach(track);
                        self.apply(LifecycleEvent::MediaStarted);
                    }
                }
            }
            Some(NegotiationEvent::Failed(cause)) => return self.transport_lost(session, cause),
            Some(NegotiationEvent::ControlOpen) => info!("control channel open"),
            Some(NegotiationEvent::Control(text)) => match session.input.as_mut() {
                Some(input) => {
                    if let Err(e) = input.handle_message(&text) {
                        warn!("remote input not applied: {e}");
                    }
                }
                None => debug!("ignoring control message on the client side"),
            },
            Some(NegotiationEvent::RemoteTrack { kind, id }) => {
                info!("remote {kind} track {id}");
                if kind == "video" {
                    self.apply(LifecycleEvent::MediaStarted);
                }
            }
        }
        Ok(())
    }

    async fn forward_input(&self, session: &ActiveSession, event: &RemoteInputEvent) {
        if session.role != Role::Client {
            debug!("host does not send input; dropping {} event", event.tag());
            return;
        }
        let text = match encode_event(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("dropping {} event: {e}", event.tag());
                return;
            }
        };
        if let Err(e) = session.negotiator.send_control(&text).await {
            debug!("dropping {} event: {e}", event.tag());
        }
    }

    // ── Restarts ──────────────────────────────────────────────────────────────

    /// Schedules a restart, or gives up once the budget is spent.
    fn transport_lost(
        &self,
        session: &mut ActiveSession,
        cause: SessionError,
    ) -> Result<(), SessionError> {
        self.peer_gone(session);
        session.restarts += 1;
        match self.config.negotiation.retry.delay_for(session.restarts) {
            Some(delay) => {
                warn!(
                    "negotiation failed ({cause}); restart {}/{} in {delay:?}",
                    session.restarts, self.config.negotiation.retry.max_restarts
                );
                session.retry_at = Some(Instant::now() + delay);
                Ok(())
            }
            None => {
                error!("giving up after {} restarts", session.restarts - 1);
                Err(cause)
            }
        }
    }

    /// Re-validates the session and renegotiates.  `None` means a disconnect
    /// arrived during the REST check.
    async fn restart(&mut self, session: &mut ActiveSession) -> Option<Result<(), SessionError>> {
        session.retry_at = None;

        let step = self.services.directory.lookup_session(&session.code);
        match until_disconnect(&mut self.commands, step).await? {
            Ok(_) => {}
            Err(DirectoryError::Session(e)) if e.is_session_fatal() => return Some(Err(e)),
            Err(e) => warn!("could not validate session before restart: {e}"),
        }

        Some(self.renegotiate(session).await)
    }

    async fn renegotiate(&mut self, session: &mut ActiveSession) -> Result<(), SessionError> {
        match session.role {
            Role::Host => match session.negotiator.offer().await {
                Ok(()) => {
                    self.apply(LifecycleEvent::PeerArrived);
                    Ok(())
                }
                Err(NegotiationError::NotReady) => {
                    debug!("no client to restart with; waiting");
                    Ok(())
                }
                Err(e) => self.transport_lost(session, e.into()),
            },
            Role::Client => {
                // The host re-offers; be ready for a fresh transport.
                session.negotiator.reset().await;
                Ok(())
            }
        }
    }

    fn peer_gone(&self, session: &mut ActiveSession) {
        self.switch.detach();
        if let Some(input) = session.input.as_mut() {
            input.reset();
        }
        self.apply(LifecycleEvent::TransportLost {
            own_role: session.role,
        });
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    async fn teardown(&mut self, mut session: ActiveSession, ending: Ending) -> Ending {
        info!("leaving session {}", session.code);
        leave(&session.outbound).await;
        session.negotiator.close().await;
        self.switch.detach();
        if session.role == Role::Host {
            if let Some(capture) = &self.services.capture {
                capture.stop().await;
            }
        }
        self.code.send_replace(None);
        ending
    }
}

/// Runs `step` unless a `Disconnect` (or the last handle dropping) comes
/// first, in which case the step is dropped and `None` returned.
async fn until_disconnect<T>(
    commands: &mut mpsc::Receiver<LifecycleCommand>,
    step: impl Future<Output = T>,
) -> Option<T> {
    tokio::pin!(step);
    loop {
        tokio::select! {
            biased;
            cmd = commands.recv() => match cmd {
                None | Some(LifecycleCommand::Disconnect) => return None,
                Some(LifecycleCommand::SendInput(event)) => {
                    debug!("not connected yet; dropping {} event", event.tag());
                }
                Some(other) => warn!("ignoring {other:?} while a session is starting"),
            },
            out = &mut step => return Some(out),
        }
    }
}

async fn leave(outbound: &mpsc::Sender<ClientMessage>) {
    if outbound.send(ClientMessage::LeaveSession).await.is_err() {
        debug!("signaling already closed");
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn capture_finished(ended: &mut Option<watch::Receiver<bool>>) {
    match ended {
        Some(rx) => {
            // A dropped sender counts as ended too.
            let _ = rx.wait_for(|ended| *ended).await;
        }
        None => std::future::pending().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{
        MockCapture, MockDirectory, MockSignalingConnector, MockTransportFactory,
        RecordingInputSink,
    };

    fn services(directory: MockDirectory, capture: Option<Arc<MockCapture>>) -> PeerServices {
        PeerServices {
            directory: Arc::new(directory),
            signaling: Arc::new(MockSignalingConnector::new()),
            transports: Arc::new(MockTransportFactory::new()),
            capture: capture.map(|c| c as Arc<dyn CaptureSource>),
            input: Arc::new(RecordingInputSink::new()),
        }
    }

    #[tokio::test]
    async fn test_new_lifecycle_is_disconnected() {
        let (_lifecycle, handle) = SessionLifecycle::new(
            services(MockDirectory::new(), None),
            PeerConfig::default(),
        );
        assert_eq!(handle.state(), LifecycleState::Disconnected);
        assert_eq!(handle.session_code(), None);
    }

    #[tokio::test]
    async fn test_join_with_malformed_code_is_error() {
        // Arrange
        let (handle, _task) = SessionLifecycle::spawn(
            services(MockDirectory::new(), None),
            PeerConfig::default(),
        );

        // Act
        handle.join("nope").await.unwrap();
        let state = handle
            .wait_for(|s| matches!(s, LifecycleState::Error(_)))
            .await
            .unwrap();

        // Assert
        assert!(matches!(state, LifecycleState::Error(SessionError::InvalidCode(_))));
    }

    #[tokio::test]
    async fn test_join_unknown_code_is_not_found() {
        let (handle, _task) = SessionLifecycle::spawn(
            services(MockDirectory::new(), None),
            PeerConfig::default(),
        );

        handle.join("AB2CDE").await.unwrap();
        let state = handle
            .wait_for(|s| matches!(s, LifecycleState::Error(_)))
            .await
            .unwrap();

        assert_eq!(state, LifecycleState::Error(SessionError::NotFound));
    }

    #[tokio::test]
    async fn test_reset_leaves_error_state() {
        let (handle, _task) = SessionLifecycle::spawn(
            services(MockDirectory::new(), None),
            PeerConfig::default(),
        );
        handle.join("nope").await.unwrap();
        handle
            .wait_for(|s| matches!(s, LifecycleState::Error(_)))
            .await
            .unwrap();

        handle.reset().await.unwrap();
        let state = handle
            .wait_for(|s| *s == LifecycleState::Disconnected)
            .await
            .unwrap();

        assert_eq!(state, LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_task() {
        let (lifecycle, handle) = SessionLifecycle::new(
            services(MockDirectory::new(), None),
            PeerConfig::default(),
        );
        drop(lifecycle);

        assert_eq!(handle.host().await, Err(LifecycleError::Stopped));
    }

    // ── until_disconnect ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_until_disconnect_returns_finished_step() {
        let (_tx, mut rx) = mpsc::channel(4);
        assert_eq!(until_disconnect(&mut rx, async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_until_disconnect_drops_pending_step_on_disconnect() {
        // Arrange
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(LifecycleCommand::SendInput(RemoteInputEvent::MouseMove(
            deskshare_core::protocol::control::PointerPosition { x: 0.5, y: 0.5 },
        )))
        .await
        .unwrap();
        tx.send(LifecycleCommand::Disconnect).await.unwrap();

        // Act
        let out = until_disconnect(&mut rx, std::future::pending::<()>()).await;

        // Assert
        assert_eq!(out, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_until_disconnect_prefers_queued_disconnect_over_ready_step() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(LifecycleCommand::Disconnect).await.unwrap();
        assert_eq!(until_disconnect(&mut rx, async { 7 }).await, None);
    }

    #[tokio::test]
    async fn test_until_disconnect_cancels_when_handles_drop() {
        let (tx, mut rx) = mpsc::channel::<LifecycleCommand>(4);
        drop(tx);
        let out = until_disconnect(&mut rx, std::future::pending::<()>()).await;
        assert_eq!(out, None);
    }
}
