//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It can be built from CLI arguments, from a TOML file, or from defaults
//! (useful for local development and tests).
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads inside the domain) makes the server easy to embed in tests.  The
//! infrastructure layer populates it.

use std::net::SocketAddr;
use std::time::Duration;

use deskshare_core::IceServer;

/// Public STUN server handed to peers when nothing else is configured.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// All runtime configuration for the server.
///
/// Build this once at startup and share it (or the services built from it)
/// behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use deskshare_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.http_bind_addr.port(), 3001);
/// assert_eq!(cfg.ws_bind_addr.port(), 3002);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address of the REST API (`/api/health`, `/api/session`).
    pub http_bind_addr: SocketAddr,

    /// Address of the signaling WebSocket endpoint.
    pub ws_bind_addr: SocketAddr,

    /// How long a session lives after creation.
    pub session_ttl: Duration,

    /// How often the sweeper scans for expired sessions.
    ///
    /// Lookups evict expired records lazily as well, so this only bounds how
    /// long an *unvisited* expired record can linger.
    pub sweep_interval: Duration,

    /// How many random codes to try before giving up with `CodespaceExhausted`.
    pub max_code_attempts: u32,

    /// STUN/TURN servers returned in every `session-joined` reply.
    pub ice_servers: Vec<IceServer>,
}

impl Default for ServerConfig {
    /// Returns a `ServerConfig` suitable for local development.
    ///
    /// | Field             | Default                          |
    /// |-------------------|----------------------------------|
    /// | http_bind_addr    | `0.0.0.0:3001`                   |
    /// | ws_bind_addr      | `0.0.0.0:3002`                   |
    /// | session_ttl       | 1 hour                           |
    /// | sweep_interval    | 5 minutes                        |
    /// | max_code_attempts | 100                              |
    /// | ice_servers       | `stun:stun.l.google.com:19302`   |
    fn default() -> Self {
        Self {
            http_bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 3002)),
            session_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            max_code_attempts: 100,
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_URL)],
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
