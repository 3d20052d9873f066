//! Roles, participant identities, and the derived session status.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of a session a participant plays.
///
/// The host produces the video stream and makes the offer; the client
/// consumes the stream, answers, and sends remote-input events back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

impl Role {
    /// Returns the opposite role.
    pub fn other(self) -> Self {
        match self {
            Role::Host => Role::Client,
            Role::Client => Role::Host,
        }
    }

    /// Returns the lowercase wire name (`"host"` or `"client"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral identity of one signaling connection.
///
/// Allocated by the transport layer when a WebSocket connects and dropped
/// when it disconnects.  Session records only *reference* identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Allocates a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a session record.
///
/// The status is never stored independently: it is always recomputed from
/// which role slots are bound (see [`SessionStatus::derive`]).
///
/// ```text
///  host slot   client slot   status
///  ─────────   ───────────   ─────────
///  empty       any           Waiting
///  bound       empty         Active
///  bound       bound         Connected
///  (record closed)           Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Connected,
    Closed,
}

impl SessionStatus {
    /// Computes the status of an open record from its slot occupancy.
    pub fn derive(has_host: bool, has_client: bool) -> Self {
        match (has_host, has_client) {
            (false, _) => SessionStatus::Waiting,
            (true, false) => SessionStatus::Active,
            (true, true) => SessionStatus::Connected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Connected => "connected",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
