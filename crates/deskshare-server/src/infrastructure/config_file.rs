//! Optional TOML configuration file for the server.
//!
//! Passed with `--config <path>`.  Every field is optional; anything absent
//! keeps its [`ServerConfig::default`] value, and CLI flags override the file.
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! http_port = 3001
//! ws_port = 3002
//!
//! [sessions]
//! ttl_secs = 3600
//! sweep_interval_secs = 300
//! max_code_attempts = 100
//!
//! [[ice_servers]]
//! urls = ["stun:stun.l.google.com:19302"]
//!
//! [[ice_servers]]
//! urls = ["turn:turn.example.org:3478"]
//! username = "deskshare"
//! credential = "secret"
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use deskshare_core::IceServer;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::ServerConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// On-disk shape of the server configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub sessions: SessionsSection,
    /// Replaces the default STUN server when non-empty.
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SessionsSection {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_http_port() -> u16 {
    3001
}
fn default_ws_port() -> u16 {
    3002
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_max_code_attempts() -> u32 {
    100
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            ws_port: default_ws_port(),
        }
    }
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_code_attempts: default_max_code_attempts(),
        }
    }
}

impl FileConfig {
    /// Converts the file contents into a validated [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero TTL, sweep interval, or
    /// attempt budget.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        if self.sessions.ttl_secs == 0 {
            return Err(ConfigError::Invalid("sessions.ttl_secs must be > 0".into()));
        }
        if self.sessions.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sessions.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.sessions.max_code_attempts == 0 {
            return Err(ConfigError::Invalid(
                "sessions.max_code_attempts must be > 0".into(),
            ));
        }

        let defaults = ServerConfig::default();
        Ok(ServerConfig {
            http_bind_addr: SocketAddr::new(self.network.bind_address, self.network.http_port),
            ws_bind_addr: SocketAddr::new(self.network.bind_address, self.network.ws_port),
            session_ttl: Duration::from_secs(self.sessions.ttl_secs),
            sweep_interval: Duration::from_secs(self.sessions.sweep_interval_secs),
            max_code_attempts: self.sessions.max_code_attempts,
            ice_servers: if self.ice_servers.is_empty() {
                defaults.ice_servers
            } else {
                self.ice_servers
            },
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses TOML text into a [`ServerConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
/// [`ConfigError::Invalid`] for out-of-range values.
pub fn parse(text: &str) -> Result<ServerConfig, ConfigError> {
    let file: FileConfig = toml::from_str(text)?;
    file.into_server_config()
}

/// Reads and parses the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
/// errors of [`parse`].
pub fn load(path: &Path) -> Result<ServerConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
