//! Domain layer: pure session types with no I/O.
//!
//! # What belongs here?
//!
//! - The session code and its generation/validation rules.
//! - Roles, participant identities, and the derived session status.
//! - The error taxonomy shared by the registry, the relay, and the peers.

pub mod code;
pub mod error;
pub mod session;

pub use code::SessionCode;
pub use error::SessionError;
pub use session::{ParticipantId, Role, SessionStatus};
