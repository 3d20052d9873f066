//! The session record: one code, two role slots, one expiry.
//!
//! # Invariants
//!
//! - At most one identity per role slot.
//! - An identity occupies at most one slot of a record.
//! - The status is never stored; [`SessionRecord::status`] derives it from
//!   slot occupancy every time it is asked.
//!
//! Records are plain data.  The registry serialises access to them; nothing
//! here locks or awaits.

use chrono::{DateTime, Utc};
use deskshare_core::{ParticipantId, Role, SessionCode, SessionError, SessionStatus};
use uuid::Uuid;

/// Server-side state of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    session_id: Uuid,
    code: SessionCode,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    host: Option<ParticipantId>,
    client: Option<ParticipantId>,
}

/// How a successful [`SessionRecord::bind`] changed the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The slot was empty and now holds the identity.
    Bound,
    /// The identity already held the slot; nothing changed.
    Rebound,
}

impl SessionRecord {
    /// Creates an empty record that expires at `expires_at`.
    pub fn new(code: SessionCode, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            code,
            created_at,
            expires_at,
            host: None,
            client: None,
        }
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `true` once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Identity bound to `role`, if any.
    pub fn holder(&self, role: Role) -> Option<ParticipantId> {
        match role {
            Role::Host => self.host,
            Role::Client => self.client,
        }
    }

    /// Role held by `identity`, if any.
    pub fn role_of(&self, identity: ParticipantId) -> Option<Role> {
        if self.host == Some(identity) {
            Some(Role::Host)
        } else if self.client == Some(identity) {
            Some(Role::Client)
        } else {
            None
        }
    }

    /// Identities still attached, host first.
    pub fn attached(&self) -> Vec<(Role, ParticipantId)> {
        let mut out = Vec::with_capacity(2);
        if let Some(id) = self.host {
            out.push((Role::Host, id));
        }
        if let Some(id) = self.client {
            out.push((Role::Client, id));
        }
        out
    }

    /// Status derived from slot occupancy.
    pub fn status(&self) -> SessionStatus {
        SessionStatus::derive(self.host.is_some(), self.client.is_some())
    }

    /// Binds `identity` to `role`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RoleConflict`] when another identity holds the
    /// slot, or when `identity` already holds the *other* slot.
    pub fn bind(&mut self, role: Role, identity: ParticipantId) -> Result<Binding, SessionError> {
        if self.holder(role.other()) == Some(identity) {
            return Err(SessionError::RoleConflict { role });
        }
        let slot = match role {
            Role::Host => &mut self.host,
            Role::Client => &mut self.client,
        };
        match *slot {
            Some(current) if current == identity => Ok(Binding::Rebound),
            Some(_) => Err(SessionError::RoleConflict { role }),
            None => {
                *slot = Some(identity);
                Ok(Binding::Bound)
            }
        }
    }

    /// Clears the slot held by `identity` and returns which role it was.
    pub fn release(&mut self, identity: ParticipantId) -> Option<Role> {
        let role = self.role_of(identity)?;
        match role {
            Role::Host => self.host = None,
            Role::Client => self.client = None,
        }
        Some(role)
    }

    /// Read-only copy for callers outside the registry lock.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            code: self.code.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            host: self.host,
            client: self.client,
            status: self.status(),
        }
    }
}

/// A point-in-time copy of a [`SessionRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub code: SessionCode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub host: Option<ParticipantId>,
    pub client: Option<ParticipantId>,
    pub status: SessionStatus,
}

impl SessionSnapshot {
    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Same snapshot with the status forced to `Closed`.
    pub fn closed(mut self) -> Self {
        self.status = SessionStatus::Closed;
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> SessionRecord {
        let now = Utc::now();
        SessionRecord::new(
            SessionCode::parse("ABCDEF").unwrap(),
            now,
            now + Duration::hours(1),
        )
    }

    #[test]
    fn test_new_record_is_waiting_and_empty() {
        let rec = record();
        assert_eq!(rec.status(), SessionStatus::Waiting);
        assert!(rec.attached().is_empty());
    }

    #[test]
    fn test_bind_host_then_client_walks_status() {
        // Arrange
        let mut rec = record();
        let host = ParticipantId::new();
        let client = ParticipantId::new();

        // Act / Assert
        assert_eq!(rec.bind(Role::Host, host), Ok(Binding::Bound));
        assert_eq!(rec.status(), SessionStatus::Active);
        assert_eq!(rec.bind(Role::Client, client), Ok(Binding::Bound));
        assert_eq!(rec.status(), SessionStatus::Connected);
    }

    #[test]
    fn test_rebind_same_identity_is_noop() {
        let mut rec = record();
        let host = ParticipantId::new();
        rec.bind(Role::Host, host).unwrap();
        assert_eq!(rec.bind(Role::Host, host), Ok(Binding::Rebound));
        assert_eq!(rec.holder(Role::Host), Some(host));
    }

    #[test]
    fn test_bind_occupied_role_conflicts() {
        let mut rec = record();
        rec.bind(Role::Client, ParticipantId::new()).unwrap();
        assert_eq!(
            rec.bind(Role::Client, ParticipantId::new()),
            Err(SessionError::RoleConflict { role: Role::Client })
        );
    }

    #[test]
    fn test_identity_cannot_hold_both_roles() {
        let mut rec = record();
        let id = ParticipantId::new();
        rec.bind(Role::Host, id).unwrap();
        assert_eq!(
            rec.bind(Role::Client, id),
            Err(SessionError::RoleConflict { role: Role::Client })
        );
    }

    #[test]
    fn test_release_host_leaves_client_waiting() {
        // Arrange
        let mut rec = record();
        let host = ParticipantId::new();
        let client = ParticipantId::new();
        rec.bind(Role::Host, host).unwrap();
        rec.bind(Role::Client, client).unwrap();

        // Act
        let released = rec.release(host);

        // Assert
        assert_eq!(released, Some(Role::Host));
        assert_eq!(rec.status(), SessionStatus::Waiting);
        assert_eq!(rec.holder(Role::Client), Some(client));
    }

    #[test]
    fn test_release_client_leaves_host_active() {
        let mut rec = record();
        let host = ParticipantId::new();
        let client = ParticipantId::new();
        rec.bind(Role::Host, host).unwrap();
        rec.bind(Role::Client, client).unwrap();

        assert_eq!(rec.release(client), Some(Role::Client));
        assert_eq!(rec.status(), SessionStatus::Active);
    }

    #[test]
    fn test_release_unknown_identity_is_none() {
        let mut rec = record();
        assert_eq!(rec.release(ParticipantId::new()), None);
    }

    #[test]
    fn test_expiry_is_inclusive_of_deadline() {
        let rec = record();
        assert!(!rec.is_expired(rec.expires_at() - Duration::milliseconds(1)));
        assert!(rec.is_expired(rec.expires_at()));
    }

    #[test]
    fn test_snapshot_reports_presence_flags() {
        let mut rec = record();
        rec.bind(Role::Host, ParticipantId::new()).unwrap();
        let snap = rec.snapshot();
        assert!(snap.has_host());
        assert!(!snap.has_client());
        assert_eq!(snap.closed().status, SessionStatus::Closed);
    }
}
