//! SessionRegistry: creates, looks up, binds, and expires sessions.
//!
//! The registry is the server's only shared mutable state.  It owns every
//! [`SessionRecord`] and exposes nothing but the operations below, so the
//! backing store could become persistent without touching callers.
//!
//! # Session lifecycle (for beginners)
//!
//! ```text
//! create_session ──► Waiting ──assign host──► Active ──assign client──► Connected
//!                       ▲                        │                         │
//!                       └──── release host ──────┴───── release client ◄───┘
//!
//! expiry (lazy on lookup, or sweep) / close_session ──► record removed
//! ```
//!
//! A record evicted lazily by a lookup or join is parked in a pending list
//! until [`SessionRegistry::drain_evicted`] (or the next sweep) hands it to
//! the relay, so the transports still attached to it are always told.
//!
//! # Atomicity
//!
//! All records sit behind a single `std::sync::Mutex`.  Every operation takes
//! the lock once, does its whole read-modify-write, and releases it before
//! returning; nothing awaits while holding it.  Two concurrent joins for the
//! same role therefore serialise, and exactly one wins.
//!
//! # Time
//!
//! The registry reads time through the [`Clock`] trait.  Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] to jump past expiry instantly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use deskshare_core::{ParticipantId, Role, SessionCode, SessionError};
use tracing::{debug, info, warn};

use crate::domain::record::{Binding, SessionRecord, SessionSnapshot};

// ── Seams ─────────────────────────────────────────────────────────────────────

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Source of candidate session codes.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> SessionCode;
}

/// Uniformly random codes from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> SessionCode {
        SessionCode::generate(&mut rand::thread_rng())
    }
}

// ── Operation results ─────────────────────────────────────────────────────────

/// Outcome of a successful [`SessionRegistry::assign_role`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignment {
    pub session: SessionSnapshot,
    /// `false` when the identity already held the role (idempotent rejoin).
    pub newly_bound: bool,
    /// Identity holding the other role, if any.
    pub peer: Option<ParticipantId>,
}

/// Outcome of a successful [`SessionRegistry::release_role`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoleRelease {
    pub role: Role,
    pub session: SessionSnapshot,
    /// Identity still holding the other role, if any.
    pub remaining_peer: Option<ParticipantId>,
}

/// A record removed by expiry or [`SessionRegistry::close_session`], with
/// whoever was still attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictedSession {
    pub session: SessionSnapshot,
    pub attached: Vec<(Role, ParticipantId)>,
}

impl EvictedSession {
    fn from_record(record: SessionRecord) -> Self {
        Self {
            attached: record.attached(),
            session: record.snapshot().closed(),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// In-memory registry of all live sessions, keyed by code.
pub struct SessionRegistry {
    records: Mutex<HashMap<SessionCode, SessionRecord>>,
    /// Expired records removed on access whose transports are not told yet.
    evicted: Mutex<Vec<EvictedSession>>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeSource>,
    ttl: chrono::Duration,
    max_code_attempts: u32,
}

impl SessionRegistry {
    /// Creates a registry using wall-clock time and random codes.
    pub fn new(ttl: Duration, max_code_attempts: u32) -> Self {
        Self::with_sources(ttl, max_code_attempts, Arc::new(SystemClock), Arc::new(RandomCodes))
    }

    /// Creates a registry with injected time and code sources.
    pub fn with_sources(
        ttl: Duration,
        max_code_attempts: u32,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeSource>,
    ) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            evicted: Mutex::new(Vec::new()),
            clock,
            codes,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            max_code_attempts,
        }
    }

    /// Current time according to the registry's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Number of records currently stored (expired-but-unswept included).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a new session with a unique code.
    ///
    /// An expired record whose code is drawn again is replaced; only live
    /// records count as collisions.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CodespaceExhausted`] if every attempt collided.
    pub fn create_session(&self) -> Result<SessionSnapshot, SessionError> {
        let now = self.clock.now();
        let mut records = self.lock();

        for attempt in 1..=self.max_code_attempts {
            let code = self.codes.next_code();
            let taken = records.get(&code).is_some_and(|r| !r.is_expired(now));
            if taken {
                debug!("session code collision on attempt {attempt}");
                continue;
            }

            let record = SessionRecord::new(code.clone(), now, now + self.ttl);
            let snapshot = record.snapshot();
            if let Some(stale) = records.insert(code, record) {
                self.park(stale);
            }
            info!("created session {}", snapshot.code);
            return Ok(snapshot);
        }

        warn!(
            "no free session code after {} attempts ({} records live)",
            self.max_code_attempts,
            records.len()
        );
        Err(SessionError::CodespaceExhausted {
            attempts: self.max_code_attempts,
        })
    }

    /// Looks up a session, evicting it if it has expired.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if no record exists.
    /// - [`SessionError::Expired`] if the record existed but has expired; the
    ///   record is removed, so the *next* call returns `NotFound`.  The
    ///   removed record waits in [`drain_evicted`](Self::drain_evicted).
    pub fn get_session(&self, code: &SessionCode) -> Result<SessionSnapshot, SessionError> {
        let now = self.clock.now();
        let mut records = self.lock();
        self.live_record(&mut records, code, now).map(|r| r.snapshot())
    }

    /// Binds `identity` to `role` in the session `code`.
    ///
    /// Rejoining with the identity that already holds the role succeeds
    /// without changing anything.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`], [`SessionError::Expired`], or
    /// [`SessionError::RoleConflict`] when a different identity holds the role.
    pub fn assign_role(
        &self,
        code: &SessionCode,
        role: Role,
        identity: ParticipantId,
    ) -> Result<RoleAssignment, SessionError> {
        let now = self.clock.now();
        let mut records = self.lock();
        let record = self.live_record(&mut records, code, now)?;

        let binding = record.bind(role, identity)?;
        if binding == Binding::Bound {
            info!("{role} {identity} joined session {code}");
        } else {
            debug!("{role} {identity} rejoined session {code}");
        }

        Ok(RoleAssignment {
            session: record.snapshot(),
            newly_bound: binding == Binding::Bound,
            peer: record.holder(role.other()),
        })
    }

    /// Identity currently holding `role` in session `code`, expired or not.
    pub fn holder(&self, code: &SessionCode, role: Role) -> Option<ParticipantId> {
        self.lock().get(code).and_then(|r| r.holder(role))
    }

    /// Clears whichever slot `identity` holds in session `code`.
    ///
    /// The record itself stays until it expires, even when both slots are
    /// now empty, so the host can reconnect with the same code.  Returns
    /// `None` if the record is gone or the identity held no slot.
    pub fn release_role(&self, code: &SessionCode, identity: ParticipantId) -> Option<RoleRelease> {
        let mut records = self.lock();
        let record = records.get_mut(code)?;
        let role = record.release(identity)?;
        info!(
            "{role} {identity} left session {code}; status now {}",
            record.status()
        );
        Some(RoleRelease {
            role,
            session: record.snapshot(),
            remaining_peer: record.holder(role.other()),
        })
    }

    /// Removes a session immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if there is no such record.
    pub fn close_session(&self, code: &SessionCode) -> Result<EvictedSession, SessionError> {
        let record = self.lock().remove(code).ok_or(SessionError::NotFound)?;
        info!("closed session {code}");
        Ok(EvictedSession::from_record(record))
    }

    /// Takes the records that lookups and joins evicted since the last call.
    pub fn drain_evicted(&self) -> Vec<EvictedSession> {
        std::mem::take(&mut *self.lock_evicted())
    }

    /// Removes every expired record and returns them with their attached
    /// identities, so the caller can disconnect those transports.
    ///
    /// Records already evicted on access and not yet drained are included.
    pub fn sweep(&self) -> Vec<EvictedSession> {
        let now = self.clock.now();
        let mut records = self.lock();
        let mut pending = self.drain_evicted();

        let expired: Vec<SessionCode> = records
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.code().clone())
            .collect();

        let mut evicted: Vec<EvictedSession> = expired
            .into_iter()
            .filter_map(|code| records.remove(&code))
            .map(EvictedSession::from_record)
            .collect();
        evicted.append(&mut pending);

        if !evicted.is_empty() {
            info!(
                "sweep removed {} expired session(s); {} remain",
                evicted.len(),
                records.len()
            );
        }
        evicted
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Returns the live record for `code`, evicting it if it has expired.
    fn live_record<'a>(
        &self,
        records: &'a mut HashMap<SessionCode, SessionRecord>,
        code: &SessionCode,
        now: DateTime<Utc>,
    ) -> Result<&'a mut SessionRecord, SessionError> {
        let expired = records
            .get(code)
            .ok_or(SessionError::NotFound)?
            .is_expired(now);
        if expired {
            if let Some(record) = records.remove(code) {
                self.park(record);
            }
            info!("session {code} expired; evicted on access");
            return Err(SessionError::Expired);
        }
        records.get_mut(code).ok_or(SessionError::NotFound)
    }

    /// Queues a removed record for the relay, unless nobody was attached.
    fn park(&self, record: SessionRecord) {
        let evicted = EvictedSession::from_record(record);
        if !evicted.attached.is_empty() {
            self.lock_evicted().push(evicted);
        }
    }

    fn lock_evicted(&self) -> MutexGuard<'_, Vec<EvictedSession>> {
        self.evicted.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionCode, SessionRecord>> {
        // A panic while holding the lock cannot leave a record half-written
        // (every mutation is a single field store), so poisoning is ignored.
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
