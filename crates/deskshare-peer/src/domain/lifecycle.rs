//! Application-visible session states and the pure transition function.
//!
//! ```text
//!                 InitRequested       Initialized        Joined(host)
//! Disconnected ───────────────► Initializing ───► Ready ─────────────► Waiting
//!      ▲                                            │                    │ PeerArrived
//!      │ Disconnected / Reset                       │ Joined(client)     ▼
//!      │                                            └──────────────► Connecting
//!    Error ◄── Failed(cause) from any state                              │ TransportConnected
//!                                                                        ▼
//!                       Streaming ◄──── MediaStarted ──────────────  Connected
//! ```
//!
//! `TransportLost` sends an established session back to `Waiting` (host) or
//! `Connecting` (client) while negotiation restarts.
//!
//! The orchestrator owns the only mutable copy of the state; everything here
//! is a value computation.

use std::fmt;

use deskshare_core::{Role, SessionError};

/// Where a peer's session currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Disconnected,
    Initializing,
    /// Signaling is up; the join request is in flight.
    Ready,
    /// Host joined; no client yet.
    Waiting,
    Connecting,
    Connected,
    /// Media is flowing: the host is sending frames or the client has a
    /// remote track.
    Streaming,
    /// Terminal until [`LifecycleEvent::Reset`].
    Error(SessionError),
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Disconnected => "disconnected",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Connected => "connected",
            LifecycleState::Streaming => "streaming",
            LifecycleState::Error(_) => "error",
        }
    }

    /// `true` once the peer transport is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, LifecycleState::Connected | LifecycleState::Streaming)
    }

    /// `true` while a session is being set up or is running.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            LifecycleState::Disconnected | LifecycleState::Error(_)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Error(cause) => write!(f, "error ({cause})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    InitRequested,
    Initialized,
    Joined(Role),
    PeerArrived,
    TransportConnected,
    MediaStarted,
    /// The transport dropped; `own_role` decides where the session waits.
    TransportLost { own_role: Role },
    Failed(SessionError),
    /// Teardown finished.
    Disconnected,
    Reset,
}

/// Computes the next state.  Events that make no sense in `state` leave it
/// unchanged.
pub fn transition(state: &LifecycleState, event: LifecycleEvent) -> LifecycleState {
    use LifecycleEvent as E;
    use LifecycleState as S;

    match (state, event) {
        (_, E::Failed(cause)) => S::Error(cause),
        (S::Error(_), E::Reset | E::Disconnected) => S::Disconnected,
        (S::Error(cause), _) => S::Error(cause.clone()),
        (_, E::Disconnected) => S::Disconnected,

        (S::Disconnected, E::InitRequested) => S::Initializing,
        (S::Initializing, E::Initialized) => S::Ready,
        (S::Ready, E::Joined(Role::Host)) => S::Waiting,
        (S::Ready, E::Joined(Role::Client)) => S::Connecting,
        (S::Waiting, E::PeerArrived) => S::Connecting,
        (S::Waiting | S::Connecting, E::TransportConnected) => S::Connected,
        (S::Connected, E::MediaStarted) => S::Streaming,
        (S::Connecting | S::Connected | S::Streaming, E::TransportLost { own_role }) => {
            match own_role {
                Role::Host => S::Waiting,
                Role::Client => S::Connecting,
            }
        }

        (current, _) => current.clone(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
