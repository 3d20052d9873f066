//! Domain layer for deskshare-server.
//!
//! Pure types with no dependencies on I/O, networking, or the async runtime.
//!
//! # What belongs in the domain layer?
//!
//! - The session record and its read-only snapshot
//! - Configuration structures
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpListener`, or `WebSocket` types
//! - File I/O or environment variable reading
//! - Locks: the registry owns the synchronisation around records

pub mod config;
pub mod record;

pub use config::ServerConfig;
pub use record::{SessionRecord, SessionSnapshot};
