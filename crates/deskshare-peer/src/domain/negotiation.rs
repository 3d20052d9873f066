//! States of the peer transport handshake.

use std::fmt;

/// Progress of one participant's transport handshake.
///
/// ```text
/// Idle → Initializing → Offering  ─┐
///                     → Answering ─┴→ Negotiating → Connected
///
/// Failed: from any non-terminal state.   Closed: after explicit teardown.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    /// A fresh transport is being created.
    Initializing,
    Offering,
    Answering,
    /// Local description set and sent; waiting for the transport to open.
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl NegotiationState {
    pub fn as_str(self) -> &'static str {
        match self {
            NegotiationState::Idle => "idle",
            NegotiationState::Initializing => "initializing",
            NegotiationState::Offering => "offering",
            NegotiationState::Answering => "answering",
            NegotiationState::Negotiating => "negotiating",
            NegotiationState::Connected => "connected",
            NegotiationState::Failed => "failed",
            NegotiationState::Closed => "closed",
        }
    }

    /// `true` while a handshake is under way and the timeout applies.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            NegotiationState::Initializing
                | NegotiationState::Offering
                | NegotiationState::Answering
                | NegotiationState::Negotiating
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_handshake_states_are_in_flight() {
        assert!(NegotiationState::Offering.is_in_flight());
        assert!(NegotiationState::Negotiating.is_in_flight());
        assert!(!NegotiationState::Idle.is_in_flight());
        assert!(!NegotiationState::Connected.is_in_flight());
        assert!(!NegotiationState::Closed.is_in_flight());
    }
}
