//! deskshare signaling server: entry point.
//!
//! Hands out session codes over HTTP and relays negotiation messages between
//! the host and client of each session over WebSocket.  Once the peers are
//! connected directly, the server only keeps the session record alive until
//! it expires.
//!
//! # Usage
//!
//! ```text
//! deskshare-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>           Optional TOML config file
//!   --bind <IP>               Address for both listeners [default: 0.0.0.0]
//!   --http-port <PORT>        REST API port [default: 3001]
//!   --ws-port <PORT>          Signaling WebSocket port [default: 3002]
//!   --session-ttl <SECS>      Session lifetime [default: 3600]
//!   --sweep-interval <SECS>   Expiry sweep period [default: 300]
//!   --ice-server <URL>        STUN/TURN URL handed to peers (repeatable)
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence over environment variables, which take precedence
//! over the config file.
//!
//! | Variable                    | Default                          |
//! |-----------------------------|----------------------------------|
//! | `DESKSHARE_CONFIG`          | (none)                           |
//! | `DESKSHARE_BIND`            | `0.0.0.0`                        |
//! | `DESKSHARE_HTTP_PORT`       | `3001`                           |
//! | `DESKSHARE_WS_PORT`         | `3002`                           |
//! | `DESKSHARE_SESSION_TTL`     | `3600`                           |
//! | `DESKSHARE_SWEEP_INTERVAL`  | `300`                            |
//! | `DESKSHARE_ICE_SERVERS`     | `stun:stun.l.google.com:19302`   |
//!
//! # Architecture overview
//!
//! ```text
//! Host peer ─┐                             ┌─ Client peer
//!            │  JSON over WebSocket :3002  │
//!            └──────► deskshare-server ◄───┘
//!                       registry / relay
//!            REST :3001 (create / lookup)
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use deskshare_core::IceServer;
use deskshare_server::application::{SessionRegistry, SignalingRelay};
use deskshare_server::domain::ServerConfig;
use deskshare_server::infrastructure::{
    config_file, run_http_api, run_signaling_server, run_sweeper, AppState,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// deskshare session and signaling server.
#[derive(Debug, Parser)]
#[command(
    name = "deskshare-server",
    about = "Session registry and signaling relay for deskshare",
    version
)]
struct Cli {
    /// Optional TOML config file; flags override its values.
    #[arg(long, env = "DESKSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address both listeners bind to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` for local connections only.
    #[arg(long, env = "DESKSHARE_BIND")]
    bind: Option<String>,

    /// TCP port of the REST API.
    #[arg(long, env = "DESKSHARE_HTTP_PORT")]
    http_port: Option<u16>,

    /// TCP port of the signaling WebSocket.
    #[arg(long, env = "DESKSHARE_WS_PORT")]
    ws_port: Option<u16>,

    /// Session lifetime in seconds.
    #[arg(long, env = "DESKSHARE_SESSION_TTL")]
    session_ttl: Option<u64>,

    /// Seconds between expiry sweeps.
    #[arg(long, env = "DESKSHARE_SWEEP_INTERVAL")]
    sweep_interval: Option<u64>,

    /// STUN/TURN server URL handed to peers on join.  Repeat the flag, or
    /// separate URLs with commas in the environment variable.
    #[arg(long = "ice-server", env = "DESKSHARE_ICE_SERVERS", value_delimiter = ',')]
    ice_servers: Vec<String>,
}

impl Cli {
    /// Builds the [`ServerConfig`]: defaults, then the config file, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, `--bind` is not
    /// an IP address, or a duration is zero.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => config_file::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            config.http_bind_addr.set_ip(ip);
            config.ws_bind_addr.set_ip(ip);
        }
        if let Some(port) = self.http_port {
            config.http_bind_addr.set_port(port);
        }
        if let Some(port) = self.ws_port {
            config.ws_bind_addr.set_port(port);
        }
        if let Some(secs) = self.session_ttl {
            anyhow::ensure!(secs > 0, "--session-ttl must be greater than zero");
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sweep_interval {
            anyhow::ensure!(secs > 0, "--sweep-interval must be greater than zero");
            config.sweep_interval = Duration::from_secs(secs);
        }
        if !self.ice_servers.is_empty() {
            config.ice_servers = self.ice_servers.into_iter().map(IceServer::stun).collect();
        }

        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level.
/// 2. CLI arguments (and the optional config file) become a [`ServerConfig`].
/// 3. The registry and relay are built and shared behind `Arc`s.
/// 4. A Ctrl+C handler clears the `running` flag and fires the shutdown
///    watch channel.
/// 5. The signaling server, REST API, and sweeper run until all three stop.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;

    info!(
        "deskshare server starting: http={}, ws={}, ttl={}s",
        config.http_bind_addr,
        config.ws_bind_addr,
        config.session_ttl.as_secs()
    );

    let registry = Arc::new(SessionRegistry::new(
        config.session_ttl,
        config.max_code_attempts,
    ));
    let relay = Arc::new(SignalingRelay::new(
        Arc::clone(&registry),
        config.ice_servers.clone(),
    ));

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    //
    // The WebSocket accept loop polls `running`; axum and the sweeper await
    // the watch channel.
    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_signal.store(false, Ordering::Relaxed);
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
                // Dropping the sender would read as a shutdown request.
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    let sweeper = tokio::spawn(run_sweeper(
        Arc::clone(&registry),
        Arc::clone(&relay),
        config.sweep_interval,
        shutdown_rx.clone(),
    ));

    let http = run_http_api(
        config.http_bind_addr,
        AppState::new(Arc::clone(&registry), Arc::clone(&relay)),
        shutdown_rx,
    );
    let ws = run_signaling_server(config.ws_bind_addr, relay, running);

    // A bind failure on either listener stops the whole process.
    let served = tokio::try_join!(http, ws);
    sweeper.abort();
    served?;

    info!("deskshare server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_server_config_defaults() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["deskshare-server"]);

        // Act
        let config = cli.into_server_config().unwrap();

        // Assert
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_cli_port_overrides() {
        let cli = Cli::parse_from([
            "deskshare-server",
            "--http-port",
            "8081",
            "--ws-port",
            "8082",
        ]);
        let config = cli.into_server_config().unwrap();
        assert_eq!(config.http_bind_addr.port(), 8081);
        assert_eq!(config.ws_bind_addr.port(), 8082);
    }

    #[test]
    fn test_cli_bind_applies_to_both_listeners() {
        let cli = Cli::parse_from(["deskshare-server", "--bind", "127.0.0.1"]);
        let config = cli.into_server_config().unwrap();
        assert_eq!(config.http_bind_addr.to_string(), "127.0.0.1:3001");
        assert_eq!(config.ws_bind_addr.to_string(), "127.0.0.1:3002");
    }

    #[test]
    fn test_cli_session_ttl_override() {
        let cli = Cli::parse_from(["deskshare-server", "--session-ttl", "60"]);
        let config = cli.into_server_config().unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_cli_zero_sweep_interval_is_rejected() {
        let cli = Cli::parse_from(["deskshare-server", "--sweep-interval", "0"]);
        assert!(cli.into_server_config().is_err());
    }

    #[test]
    fn test_cli_repeated_ice_servers() {
        let cli = Cli::parse_from([
            "deskshare-server",
            "--ice-server",
            "stun:a.example.org:3478",
            "--ice-server",
            "stun:b.example.org:3478",
        ]);
        let config = cli.into_server_config().unwrap();
        assert_eq!(
            config.ice_servers,
            vec![
                IceServer::stun("stun:a.example.org:3478"),
                IceServer::stun("stun:b.example.org:3478"),
            ]
        );
    }

    #[test]
    fn test_cli_invalid_bind_returns_error() {
        // Arrange: provide an invalid IP address string
        let cli = Cli {
            config: None,
            bind: Some("not.an.ip".to_string()),
            http_port: None,
            ws_port: None,
            session_ttl: None,
            sweep_interval: None,
            ice_servers: Vec::new(),
        };

        // Act
        let result = cli.into_server_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_missing_config_file_returns_error() {
        let cli = Cli::parse_from(["deskshare-server", "--config", "/nonexistent/deskshare.toml"]);
        assert!(cli.into_server_config().is_err());
    }
}
