//! Negotiator: drives one participant's transport handshake.
//!
//! # Roles
//!
//! - The **host** is always the offerer.  When a client identity becomes
//!   known it creates a fresh transport, adds the video track and the
//!   `control` channel, and sends an offer through signaling.
//! - The **client** is always the answerer.  It creates its transport when
//!   the offer arrives and answers it.
//!
//! # Ordering
//!
//! Local ICE candidates are forwarded in the order the transport reports
//! them; remote candidates are applied in arrival order.  Nothing is batched
//! or reordered.
//!
//! # Timing
//!
//! The negotiator owns no tasks.  The lifecycle polls [`Negotiator::next_event`]
//! and sleeps until [`Negotiator::deadline`]; when the deadline passes it calls
//! [`Negotiator::on_timeout`].

use std::sync::Arc;

use deskshare_core::{
    ClientMessage, IceServer, NegotiationMessage, NegotiationPayload, ParticipantId, Role,
    SessionError,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::ports::{
    FrameSink, PeerTransport, TransportError, TransportEvent, TransportFactory, TransportState,
};
use crate::domain::{NegotiationConfig, NegotiationState};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// An offer was requested before the peer identity was known.
    #[error("negotiation target is not known yet")]
    NotReady,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("signaling channel closed")]
    SignalingClosed,

    /// The control channel was used while no transport is connected.
    #[error("no connected transport")]
    NotConnected,
}

impl From<NegotiationError> for SessionError {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::NotReady => SessionError::NegotiationNotReady,
            other => SessionError::TransportFailure(other.to_string()),
        }
    }
}

/// What the lifecycle needs to react to after a transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    Connected,
    Failed(SessionError),
    ControlOpen,
    Control(String),
    RemoteTrack { kind: String, id: String },
}

pub struct Negotiator {
    role: Role,
    self_id: ParticipantId,
    config: NegotiationConfig,
    factory: Arc<dyn TransportFactory>,
    ice_servers: Vec<IceServer>,
    signaling: mpsc::Sender<ClientMessage>,

    state: NegotiationState,
    target: Option<ParticipantId>,
    transport: Option<Arc<dyn PeerTransport>>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    media: Option<Arc<dyn FrameSink>>,
    awaiting_answer: bool,
    deadline: Option<Instant>,
}

impl Negotiator {
    pub fn new(
        role: Role,
        self_id: ParticipantId,
        config: NegotiationConfig,
        factory: Arc<dyn TransportFactory>,
        ice_servers: Vec<IceServer>,
        signaling: mpsc::Sender<ClientMessage>,
    ) -> Self {
        Self {
            role,
            self_id,
            config,
            factory,
            ice_servers,
            signaling,
            state: NegotiationState::Idle,
            target: None,
            transport: None,
            events: None,
            media: None,
            awaiting_answer: false,
            deadline: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn target(&self) -> Option<ParticipantId> {
        self.target
    }

    /// When the current handshake times out, if one is in flight.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The outgoing video track of the current transport (host only).
    pub fn media_sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.media.clone()
    }

    // ── Peer identity ─────────────────────────────────────────────────────────

    /// Records the identity of the other participant.
    ///
    /// A different identity supersedes the previous one: its transport is
    /// closed, even if it was connected.  The host then offers to the new
    /// peer right away.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Negotiator::offer`] on the host.
    pub async fn peer_joined(&mut self, peer: ParticipantId) -> Result<(), NegotiationError> {
        if self.target != Some(peer) {
            if let Some(previous) = self.target {
                info!("peer {peer} supersedes {previous}; restarting negotiation");
            }
            self.reset().await;
            self.target = Some(peer);
        }
        match self.role {
            Role::Host => self.offer().await,
            Role::Client => Ok(()),
        }
    }

    /// Forgets `peer` if it is the current target.
    pub async fn peer_left(&mut self, peer: ParticipantId) {
        if self.target == Some(peer) {
            self.reset().await;
            self.target = None;
        }
    }

    // ── Offer / answer ────────────────────────────────────────────────────────

    /// Starts a fresh handshake towards the current target.
    ///
    /// # Errors
    ///
    /// - [`NegotiationError::NotReady`] if no target is known yet.
    /// - [`NegotiationError::Transport`] if the transport cannot be set up;
    ///   the state is then `Failed`.
    pub async fn offer(&mut self) -> Result<(), NegotiationError> {
        let target = self.target.ok_or(NegotiationError::NotReady)?;
        self.discard_transport().await;

        let result = self.offer_to(target).await;
        if result.is_err() {
            self.fail();
        }
        result
    }

    async fn offer_to(&mut self, target: ParticipantId) -> Result<(), NegotiationError> {
        self.state = NegotiationState::Initializing;
        self.arm_deadline();
        let transport = self.open_transport().await?;

        if self.role == Role::Host {
            self.media = Some(transport.add_video_track().await?);
        }
        transport.create_control_channel().await?;

        self.state = NegotiationState::Offering;
        let sdp = transport.create_offer().await?;
        self.awaiting_answer = true;
        self.send(ClientMessage::Offer { sdp, target }).await?;

        self.state = NegotiationState::Negotiating;
        debug!("offer sent to {target}");
        Ok(())
    }

    /// Applies a relayed offer, answer, or candidate.
    ///
    /// Messages from anyone but the current target are ignored.  An answer
    /// with no offer outstanding (e.g. a duplicate while `Connected`) is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a description cannot be applied; the state is then
    /// `Failed`.  A rejected candidate is only logged.
    pub async fn handle_signal(&mut self, msg: NegotiationMessage) -> Result<(), NegotiationError> {
        if msg.target != self.self_id {
            debug!("ignoring {} addressed to {}", msg.payload.type_name(), msg.target);
            return Ok(());
        }
        match self.target {
            Some(target) if target != msg.from => {
                debug!(
                    "ignoring {} from {}; current peer is {target}",
                    msg.payload.type_name(),
                    msg.from
                );
                return Ok(());
            }
            _ => {}
        }

        let result = match msg.payload {
            NegotiationPayload::Offer { sdp } => self.handle_offer(msg.from, &sdp).await,
            NegotiationPayload::Answer { sdp } => self.handle_answer(&sdp).await,
            NegotiationPayload::IceCandidate { candidate } => {
                match &self.transport {
                    Some(transport) => {
                        if let Err(e) = transport.add_remote_candidate(candidate).await {
                            warn!("remote candidate from {} rejected: {e}", msg.from);
                        }
                    }
                    None => debug!("dropping candidate from {}: no transport", msg.from),
                }
                Ok(())
            }
        };
        if result.is_err() {
            self.fail();
        }
        result
    }

    async fn handle_offer(&mut self, from: ParticipantId, sdp: &str) -> Result<(), NegotiationError> {
        if self.role == Role::Host {
            warn!("host received an offer from {from}; ignoring");
            return Ok(());
        }

        // Renegotiation on a live transport keeps the connection.
        if self.state == NegotiationState::Connected {
            if let Some(transport) = self.transport.clone() {
                let answer = transport.accept_offer(sdp).await?;
                return self.send(ClientMessage::Answer { sdp: answer, target: from }).await;
            }
        }

        self.discard_transport().await;
        self.target = Some(from);
        self.state = NegotiationState::Initializing;
        self.arm_deadline();
        let transport = self.open_transport().await?;

        self.state = NegotiationState::Answering;
        let answer = transport.accept_offer(sdp).await?;
        self.send(ClientMessage::Answer { sdp: answer, target: from }).await?;

        self.state = NegotiationState::Negotiating;
        debug!("answer sent to {from}");
        Ok(())
    }

    async fn handle_answer(&mut self, sdp: &str) -> Result<(), NegotiationError> {
        if !self.awaiting_answer {
            debug!("no offer outstanding (state {}); ignoring answer", self.state);
            return Ok(());
        }
        let Some(transport) = self.transport.clone() else {
            debug!("answer arrived without a transport; ignoring");
            return Ok(());
        };
        transport.accept_answer(sdp).await?;
        self.awaiting_answer = false;
        Ok(())
    }

    // ── Transport events ──────────────────────────────────────────────────────

    /// Waits for the next event of the current transport.
    ///
    /// Never resolves while there is no transport, so it can sit in a
    /// `select!` unconditionally.
    pub async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.events.as_mut() {
                Some(rx) => match rx.recv().await {
                    Some(event) => return event,
                    None => self.events = None,
                },
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Reacts to one transport event.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::SignalingClosed`] if a local candidate
    /// cannot be forwarded.
    pub async fn handle_transport_event(
        &mut self,
        event: TransportEvent,
    ) -> Result<Option<NegotiationEvent>, NegotiationError> {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                match self.target {
                    Some(target) => {
                        self.send(ClientMessage::IceCandidate { candidate, target })
                            .await?
                    }
                    None => debug!("dropping local candidate: no target"),
                }
                Ok(None)
            }
            TransportEvent::StateChanged(TransportState::Connected) => {
                if self.state == NegotiationState::Connected {
                    return Ok(None);
                }
                self.state = NegotiationState::Connected;
                self.deadline = None;
                info!("transport to {:?} connected", self.target);
                Ok(Some(NegotiationEvent::Connected))
            }
            TransportEvent::StateChanged(s @ (TransportState::Failed | TransportState::Closed)) => {
                if !(self.state.is_in_flight() || self.state == NegotiationState::Connected) {
                    return Ok(None);
                }
                self.fail();
                let cause = match s {
                    TransportState::Failed => "peer connection failed",
                    _ => "peer connection closed",
                };
                Ok(Some(NegotiationEvent::Failed(SessionError::TransportFailure(
                    cause.to_string(),
                ))))
            }
            TransportEvent::StateChanged(other) => {
                debug!("transport state {other:?}");
                Ok(None)
            }
            TransportEvent::ControlOpen => Ok(Some(NegotiationEvent::ControlOpen)),
            TransportEvent::ControlMessage(text) => Ok(Some(NegotiationEvent::Control(text))),
            TransportEvent::RemoteTrack { kind, id } => {
                Ok(Some(NegotiationEvent::RemoteTrack { kind, id }))
            }
        }
    }

    /// Marks the in-flight handshake as timed out.
    pub fn on_timeout(&mut self) -> SessionError {
        warn!("negotiation with {:?} timed out in state {}", self.target, self.state);
        self.fail();
        SessionError::NegotiationTimeout(self.config.timeout)
    }

    /// Sends one control-channel message.
    ///
    /// # Errors
    ///
    /// [`NegotiationError::NotConnected`] unless the transport is connected.
    pub async fn send_control(&self, text: &str) -> Result<(), NegotiationError> {
        match (&self.transport, self.state) {
            (Some(transport), NegotiationState::Connected) => {
                transport.send_control(text).await.map_err(Into::into)
            }
            _ => Err(NegotiationError::NotConnected),
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Closes the transport and returns to `Idle`, keeping the target.
    pub async fn reset(&mut self) {
        self.discard_transport().await;
        self.state = NegotiationState::Idle;
    }

    /// Closes the transport for good.
    pub async fn close(&mut self) {
        self.discard_transport().await;
        self.target = None;
        self.state = NegotiationState::Closed;
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    async fn open_transport(&mut self) -> Result<Arc<dyn PeerTransport>, NegotiationError> {
        let setup = self.factory.create(&self.ice_servers).await?;
        self.transport = Some(Arc::clone(&setup.transport));
        self.events = Some(setup.events);
        Ok(setup.transport)
    }

    async fn discard_transport(&mut self) {
        self.events = None;
        self.media = None;
        self.awaiting_answer = false;
        self.deadline = None;
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
    }

    fn arm_deadline(&mut self) {
        self.deadline = Some(Instant::now() + self.config.timeout);
    }

    fn fail(&mut self) {
        self.state = NegotiationState::Failed;
        self.deadline = None;
        self.awaiting_answer = false;
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), NegotiationError> {
        self.signaling
            .send(msg)
            .await
            .map_err(|_| NegotiationError::SignalingClosed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
