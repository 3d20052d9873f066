//! Application layer for deskshare-server.
//!
//! The application layer holds the server's behaviour: it knows *what* to
//! do with sessions and signaling messages, but leaves sockets and HTTP to
//! the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Issuing session codes and binding identities to roles (`registry`)
//! - Expiring sessions lazily on access and in bulk on sweep (`registry`)
//! - Routing join, leave, and negotiation messages between peers (`relay`)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing and JSON parsing of frames

pub mod registry;
pub mod relay;

pub use registry::{
    Clock, CodeSource, EvictedSession, ManualClock, RandomCodes, RoleAssignment, RoleRelease,
    SessionRegistry, SystemClock,
};
pub use relay::{Membership, Outbound, SignalingRelay};
