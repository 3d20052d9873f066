//! Error taxonomy shared by the registry, the relay, and both peers.
//!
//! Registry and relay errors are returned synchronously as typed values.
//! Negotiation and capture failures travel asynchronously: they end up as
//! the cause carried by the lifecycle's `Error` state.

use std::time::Duration;

use thiserror::Error;

use crate::domain::session::Role;

/// Every way a session can fail, from code lookup to screen capture.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No record exists for the code.
    #[error("session not found")]
    NotFound,

    /// The record exists but its TTL has elapsed.
    #[error("session expired")]
    Expired,

    /// Another identity already holds the requested role.
    #[error("{role} already connected to this session")]
    RoleConflict { role: Role },

    /// No transport opened within the negotiation window.
    #[error("peer negotiation timed out after {0:?}")]
    NegotiationTimeout(Duration),

    /// The peer transport reported failure or closed underneath us.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The user (or the platform) refused screen capture.
    #[error("screen capture permission denied")]
    CapturePermissionDenied,

    /// The code generator could not find a free code.
    #[error("no free session code after {attempts} attempts")]
    CodespaceExhausted { attempts: u32 },

    /// An offer was requested before the peer identity was known.
    #[error("negotiation target is not known yet")]
    NegotiationNotReady,

    /// The supplied code does not have the session-code format.
    #[error("invalid session code '{0}'")]
    InvalidCode(String),

    /// The server refused a request for a reason this build does not know.
    #[error("rejected by server: {0}")]
    Rejected(String),
}

impl SessionError {
    /// Returns `true` when the error ends the session for good.
    ///
    /// A fatal error is still not fatal to the process: the user may create
    /// or join another session right away.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::NotFound | SessionError::Expired | SessionError::InvalidCode(_)
        )
    }

    /// Recovers the typed error from the text of a `session-error` message.
    ///
    /// The relay sends `to_string()` of the error it hit, so every variant it
    /// can produce maps back; anything else becomes [`SessionError::Rejected`].
    pub fn from_server_message(text: &str) -> Self {
        let known = [
            SessionError::NotFound,
            SessionError::Expired,
            SessionError::RoleConflict { role: Role::Host },
            SessionError::RoleConflict { role: Role::Client },
        ];
        if let Some(err) = known.into_iter().find(|e| e.to_string() == text) {
            return err;
        }
        match text
            .strip_prefix("invalid session code '")
            .and_then(|rest| rest.strip_suffix('\''))
        {
            Some(code) => SessionError::InvalidCode(code.to_string()),
            None => SessionError::Rejected(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_conflict_message_names_the_role() {
        let err = SessionError::RoleConflict { role: Role::Client };
        assert_eq!(err.to_string(), "client already connected to this session");
    }

    #[test]
    fn test_expiry_and_lookup_failures_are_session_fatal() {
        assert!(SessionError::Expired.is_session_fatal());
        assert!(SessionError::NotFound.is_session_fatal());
        assert!(!SessionError::NegotiationTimeout(Duration::from_secs(30)).is_session_fatal());
        assert!(!SessionError::TransportFailure("ice".into()).is_session_fatal());
    }

    #[test]
    fn test_server_message_maps_back_to_variant() {
        for err in [
            SessionError::NotFound,
            SessionError::Expired,
            SessionError::RoleConflict { role: Role::Host },
            SessionError::InvalidCode("ab".into()),
        ] {
            assert_eq!(SessionError::from_server_message(&err.to_string()), err);
        }
    }

    #[test]
    fn test_unknown_server_message_is_rejected_variant() {
        assert_eq!(
            SessionError::from_server_message("server is on fire"),
            SessionError::Rejected("server is on fire".into())
        );
    }
}
