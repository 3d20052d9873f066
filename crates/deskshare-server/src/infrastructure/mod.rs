//! Infrastructure layer for deskshare-server.
//!
//! The infrastructure layer handles all I/O: the signaling WebSocket, the
//! REST API, the expiry timer, and the optional config file.
//!
//! # Responsibilities
//!
//! - Binding the signaling listener and upgrading connections to WebSocket
//! - Moving JSON frames between sockets and the relay's per-peer queues
//! - Serving the REST endpoints with axum
//! - Running the periodic expiry sweep
//! - Reading the TOML config file
//!
//! # What does NOT belong here?
//!
//! - Deciding who receives a message (that is the relay)
//! - Session code and role rules (that is the registry)

pub mod config_file;
pub mod http_api;
pub mod sweeper;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use http_api::{build_router, run_http_api, AppState};
pub use sweeper::run_sweeper;
pub use ws_server::{run_signaling_server, serve_signaling};
