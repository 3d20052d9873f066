//! SignalingRelay: routes signaling messages between the peers of a session.
//!
//! The relay owns one outbound `mpsc` channel per connected transport and
//! remembers which session/role each identity is bound to.  It never touches
//! sockets: the WebSocket layer drains each channel into its socket.
//!
//! # Message flow
//!
//! ```text
//! join-session ──► registry.assign_role ──► session-joined  (to joiner)
//!                                       └─► peer-joined     (to the other role)
//! offer/answer/ice-candidate {target}   ──► same message with {from} (to target)
//! leave-session / disconnect ──► registry.release_role ──► peer-left (to remaining)
//! sweep / close / expiry found on access
//!                ──► session-expired + Close (to every attached transport)
//! ```
//!
//! Negotiation messages are fire-and-forget: no acknowledgement, and a
//! message to an absent or foreign target is dropped.
//!
//! # Locking
//!
//! The relay's peer table and the registry each have their own lock, and
//! neither is held across an `.await`.  `join` reads the registry while
//! holding the peer table; the registry never calls back into the relay,
//! so the order is always peer table first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use deskshare_core::{
    ClientMessage, IceServer, NegotiationMessage, ParticipantId, Role, ServerMessage, SessionCode,
    SessionError,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::application::registry::{EvictedSession, SessionRegistry};

/// Capacity of each transport's outbound queue.
pub const OUTBOUND_QUEUE: usize = 128;

/// Something the transport layer must do for one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialize and send this message.
    Message(ServerMessage),
    /// Close the connection.
    Close,
}

/// The session and role a transport is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub code: SessionCode,
    pub role: Role,
}

struct PeerLink {
    tx: mpsc::Sender<Outbound>,
    membership: Option<Membership>,
}

/// Routes signaling messages between transports.
pub struct SignalingRelay {
    registry: Arc<SessionRegistry>,
    ice_servers: Vec<IceServer>,
    peers: Mutex<HashMap<ParticipantId, PeerLink>>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<SessionRegistry>, ice_servers: Vec<IceServer>) -> Self {
        Self {
            registry,
            ice_servers,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new transport and returns its identity and outbound queue.
    pub fn connect(&self) -> (ParticipantId, mpsc::Receiver<Outbound>) {
        let id = ParticipantId::new();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        self.lock_peers().insert(
            id,
            PeerLink {
                tx,
                membership: None,
            },
        );
        debug!("transport {id} registered");
        (id, rx)
    }

    /// Number of registered transports.
    pub fn connected(&self) -> usize {
        self.lock_peers().len()
    }

    /// Session and role currently held by `id`.
    pub fn membership(&self, id: ParticipantId) -> Option<Membership> {
        self.lock_peers()
            .get(&id)
            .and_then(|link| link.membership.clone())
    }

    /// Handles one message received from transport `from`.
    pub fn handle_message(&self, from: ParticipantId, msg: ClientMessage) {
        debug!("{from} → relay: {}", msg.type_name());
        match msg {
            ClientMessage::JoinSession { session_code, role } => {
                self.join(from, &session_code, role)
            }
            ClientMessage::LeaveSession => self.leave(from),
            other => {
                if let Some(negotiation) = other.into_negotiation(from) {
                    self.forward(negotiation);
                }
            }
        }
    }

    /// Releases whatever `from` held and forgets its transport.
    pub fn disconnect(&self, from: ParticipantId) {
        self.leave(from);
        if self.lock_peers().remove(&from).is_some() {
            debug!("transport {from} unregistered");
        }
    }

    /// Tells every transport attached to an evicted session that it has
    /// expired, then asks the transport layer to close it.
    pub fn evict(&self, evicted: &[EvictedSession]) {
        let mut peers = self.lock_peers();
        for session in evicted {
            for (role, id) in &session.attached {
                let Some(link) = peers.get_mut(id) else {
                    continue;
                };
                link.membership = None;
                info!("evicting {role} {id} from session {}", session.session.code);
                push(
                    *id,
                    link,
                    Outbound::Message(ServerMessage::SessionExpired {
                        session_code: session.session.code.to_string(),
                    }),
                );
                push(*id, link, Outbound::Close);
            }
        }
    }

    /// Disconnects the transports of sessions that lookups or joins found
    /// expired since the last call.
    pub fn evict_lapsed(&self) {
        let lapsed = self.registry.drain_evicted();
        if !lapsed.is_empty() {
            self.evict(&lapsed);
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    fn join(&self, from: ParticipantId, raw_code: &str, role: Role) {
        let code = match SessionCode::parse(raw_code) {
            Ok(code) => code,
            Err(e) => return self.reply_error(from, e.to_string()),
        };

        // Joining a different session (or the other role) gives up the old one.
        match self.membership(from) {
            Some(current) if current.code == code && current.role == role => {}
            Some(_) => self.leave(from),
            None => {}
        }

        let assignment = match self.registry.assign_role(&code, role, from) {
            Ok(a) => a,
            Err(e) => {
                info!("{from} could not join {code} as {role}: {e}");
                self.reply_error(from, e.to_string());
                if e == SessionError::Expired {
                    self.evict_lapsed();
                }
                return;
            }
        };

        let mut peers = self.lock_peers();
        let Some(link) = peers.get_mut(&from) else {
            // The transport vanished between the two locks; undo the binding.
            drop(peers);
            self.registry.release_role(&code, from);
            return;
        };
        link.membership = Some(Membership {
            code: code.clone(),
            role,
        });
        push(
            from,
            link,
            Outbound::Message(ServerMessage::SessionJoined {
                peer_id: from,
                session_code: code.to_string(),
                role,
                ice_servers: self.ice_servers.clone(),
            }),
        );

        // The other side may have left since the registry bound us; only
        // announce it while it still holds its slot.
        let peer = assignment
            .peer
            .filter(|&peer| self.registry.holder(&code, role.other()) == Some(peer));
        if let Some(peer) = peer {
            // The joiner learns about whoever is already there.
            push(
                from,
                link,
                Outbound::Message(ServerMessage::PeerJoined {
                    peer_id: peer,
                    role: role.other(),
                }),
            );
            if assignment.newly_bound {
                if let Some(peer_link) = peers.get(&peer) {
                    push(
                        peer,
                        peer_link,
                        Outbound::Message(ServerMessage::PeerJoined {
                            peer_id: from,
                            role,
                        }),
                    );
                }
            }
        }
    }

    fn leave(&self, from: ParticipantId) {
        let membership = {
            let mut peers = self.lock_peers();
            peers.get_mut(&from).and_then(|link| link.membership.take())
        };
        let Some(membership) = membership else {
            return;
        };

        let Some(release) = self.registry.release_role(&membership.code, from) else {
            return;
        };
        if let Some(remaining) = release.remaining_peer {
            if let Some(link) = self.lock_peers().get(&remaining) {
                push(
                    remaining,
                    link,
                    Outbound::Message(ServerMessage::PeerLeft {
                        peer_id: from,
                        role: release.role,
                    }),
                );
            }
        }
    }

    fn forward(&self, msg: NegotiationMessage) {
        let peers = self.lock_peers();
        let sender_session = peers
            .get(&msg.from)
            .and_then(|link| link.membership.as_ref())
            .map(|m| &m.code);
        let Some(sender_session) = sender_session else {
            debug!("{} sent {} before joining; dropped", msg.from, msg.payload.type_name());
            return;
        };

        let target = msg.target;
        let Some(link) = peers.get(&target) else {
            debug!("{} target {target} is gone; dropped", msg.payload.type_name());
            return;
        };
        if link.membership.as_ref().map(|m| &m.code) != Some(sender_session) {
            warn!(
                "{} tried to send {} outside its session; dropped",
                msg.from,
                msg.payload.type_name()
            );
            return;
        }

        debug!("relay {} {} → {target}", msg.payload.type_name(), msg.from);
        push(target, link, Outbound::Message(msg.into_delivery()));
    }

    fn reply_error(&self, to: ParticipantId, error: String) {
        if let Some(link) = self.lock_peers().get(&to) {
            push(to, link, Outbound::Message(ServerMessage::SessionError { error }));
        }
    }

    fn lock_peers(&self) -> MutexGuard<'_, HashMap<ParticipantId, PeerLink>> {
        self.peers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Queues `out` for `id` without waiting.
fn push(id: ParticipantId, link: &PeerLink, out: Outbound) {
    match link.tx.try_send(out) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!("outbound queue for {id} is full; message dropped"),
        Err(TrySendError::Closed(_)) => debug!("transport {id} already closed"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
