//! deskshare peer: entry point.
//!
//! Hosts a new session or joins an existing one, then keeps running until the
//! session ends or the user presses Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! deskshare-peer [OPTIONS] host --source <IVF> [--loop]
//! deskshare-peer [OPTIONS] join <CODE> [--frame <WxH>]
//!
//! Options:
//!   --api <URL>                   REST API base [default: http://127.0.0.1:3001]
//!   --signaling <URL>             Signaling WebSocket [default: ws://127.0.0.1:3002]
//!   --request-timeout <SECS>      REST and join timeout [default: 10]
//!   --connect-timeout <SECS>      WebSocket connect timeout [default: 10]
//!   --negotiation-timeout <SECS>  Handshake limit per attempt [default: 30]
//!   --max-restarts <N>            Negotiation restarts before giving up [default: 3]
//!   --viewport <WxH>              Surface remote pointer input maps onto [default: 1920x1080]
//! ```
//!
//! # Screen source and input
//!
//! The host streams a pre-encoded VP8 IVF file in place of a live screen
//! grab, and logs applied remote input instead of injecting it.  The client
//! reads control events from stdin, one JSON message per line, e.g.
//!
//! ```text
//! {"type":"mouse-move","payload":{"x":0.5,"y":0.25}}
//! ```
//!
//! With `join --frame 1280x720` the pointer coordinates are pixels inside a
//! 1280x720 view of the remote screen and are normalised before sending.
//!
//! # Environment variable overrides
//!
//! | Variable                           | Flag                     |
//! |------------------------------------|--------------------------|
//! | `DESKSHARE_API`                    | `--api`                  |
//! | `DESKSHARE_SIGNALING`              | `--signaling`            |
//! | `DESKSHARE_REQUEST_TIMEOUT`        | `--request-timeout`      |
//! | `DESKSHARE_CONNECT_TIMEOUT`        | `--connect-timeout`      |
//! | `DESKSHARE_NEGOTIATION_TIMEOUT`    | `--negotiation-timeout`  |
//! | `DESKSHARE_MAX_RESTARTS`           | `--max-restarts`         |
//! | `DESKSHARE_VIEWPORT`               | `--viewport`             |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deskshare_core::protocol::control::decode_event;
use deskshare_core::FrameSize;
use deskshare_peer::application::{LifecycleHandle, PeerServices, SessionLifecycle};
use deskshare_peer::application::ports::CaptureSource;
use deskshare_peer::domain::{LifecycleState, PeerConfig};
use deskshare_peer::infrastructure::{
    ApiClient, IvfFileCapture, LoggingInputSink, WebRtcTransportFactory, WsSignalingConnector,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// deskshare peer: share a screen or view someone else's.
#[derive(Debug, Parser)]
#[command(
    name = "deskshare-peer",
    about = "Host or join a deskshare session",
    version
)]
struct Cli {
    /// Base URL of the session REST API.
    #[arg(long, env = "DESKSHARE_API")]
    api: Option<String>,

    /// URL of the signaling WebSocket.
    #[arg(long, env = "DESKSHARE_SIGNALING")]
    signaling: Option<String>,

    /// Seconds allowed for one REST call or the join reply.
    #[arg(long, env = "DESKSHARE_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Seconds allowed for opening the signaling WebSocket.
    #[arg(long, env = "DESKSHARE_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Seconds one peer-connection handshake may take.
    #[arg(long, env = "DESKSHARE_NEGOTIATION_TIMEOUT")]
    negotiation_timeout: Option<u64>,

    /// Handshake restarts before the session is given up.
    #[arg(long, env = "DESKSHARE_MAX_RESTARTS")]
    max_restarts: Option<u32>,

    /// Local surface remote pointer input is mapped onto, as `WIDTHxHEIGHT`.
    #[arg(long, env = "DESKSHARE_VIEWPORT", value_parser = parse_viewport)]
    viewport: Option<FrameSize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a session and share the given recording.
    Host {
        /// VP8 IVF file streamed as the shared screen.
        #[arg(long)]
        source: PathBuf,

        /// Restart the file at its end instead of ending the session.
        #[arg(long = "loop")]
        looping: bool,
    },
    /// Join an existing session as the viewer.
    Join {
        /// Six-character session code from the host.
        code: String,

        /// Size of the view stdin pointer coordinates refer to, as
        /// `WIDTHxHEIGHT`.  Without it they must already be in `[0, 1]`.
        #[arg(long, value_parser = parse_viewport)]
        frame: Option<FrameSize>,
    },
}

fn parse_viewport(raw: &str) -> Result<FrameSize, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("viewport dimensions must be non-zero".to_string());
    }
    Ok(FrameSize::new(width, height))
}

impl Cli {
    /// Builds the [`PeerConfig`]: defaults, then flags and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is zero.
    fn peer_config(&self) -> anyhow::Result<PeerConfig> {
        let mut config = PeerConfig::default();

        if let Some(api) = &self.api {
            config.api_base = api.trim_end_matches('/').to_string();
        }
        if let Some(url) = &self.signaling {
            config.signaling_url = url.clone();
        }
        if let Some(secs) = self.request_timeout {
            anyhow::ensure!(secs > 0, "--request-timeout must be greater than zero");
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.connect_timeout {
            anyhow::ensure!(secs > 0, "--connect-timeout must be greater than zero");
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.negotiation_timeout {
            anyhow::ensure!(secs > 0, "--negotiation-timeout must be greater than zero");
            config.negotiation.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_restarts {
            config.negotiation.retry.max_restarts = n;
        }
        if let Some(viewport) = self.viewport {
            config.viewport = viewport;
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
/// 2. CLI arguments become a [`PeerConfig`].
/// 3. The REST, signaling, transport, capture, and input adapters are built
///    and handed to a spawned [`SessionLifecycle`].
/// 4. A Ctrl+C handler asks the lifecycle to disconnect.
/// 5. `main` follows the state until the session ends.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.peer_config()?;

    info!(
        "deskshare peer starting: api={}, signaling={}",
        config.api_base, config.signaling_url
    );

    // ── Adapters ──────────────────────────────────────────────────────────────
    let directory = ApiClient::new(&config.api_base, config.request_timeout)
        .context("failed to build the REST client")?;
    let signaling = WsSignalingConnector::new(config.signaling_url.clone(), config.connect_timeout);
    let capture = match &cli.command {
        Command::Host { source, looping } => {
            Some(Arc::new(IvfFileCapture::new(source, *looping)) as Arc<dyn CaptureSource>)
        }
        Command::Join { .. } => None,
    };
    let services = PeerServices {
        directory: Arc::new(directory),
        signaling: Arc::new(signaling),
        transports: Arc::new(WebRtcTransportFactory::new()),
        capture,
        input: Arc::new(LoggingInputSink::new()),
    };

    let (handle, task) = SessionLifecycle::spawn(services, config);

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; leaving session");
                let _ = ctrl_c_handle.disconnect().await;
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Start ─────────────────────────────────────────────────────────────────
    match &cli.command {
        Command::Host { .. } => handle.host().await?,
        Command::Join { code, frame } => {
            handle.join(code.clone()).await?;
            tokio::spawn(forward_stdin(handle.clone(), *frame));
        }
    }

    let outcome = follow(&handle).await;
    drop(handle);
    let _ = task.await;
    info!("deskshare peer stopped");
    outcome
}

/// Logs progress until the session returns to `Disconnected` or fails.
async fn follow(handle: &LifecycleHandle) -> anyhow::Result<()> {
    let mut states = handle.subscribe();
    let mut announced = false;
    loop {
        states
            .changed()
            .await
            .context("session lifecycle stopped unexpectedly")?;
        let state = states.borrow_and_update().clone();

        if !announced {
            if let Some(code) = handle.session_code() {
                println!("session code: {code}");
                announced = true;
            }
        }

        match state {
            LifecycleState::Disconnected => return Ok(()),
            LifecycleState::Error(cause) => {
                return Err(anyhow::Error::new(cause).context("session ended with an error"))
            }
            LifecycleState::Streaming => println!("streaming"),
            _ => {}
        }
    }
}

/// Reads control events from stdin, one JSON message per line, and sends
/// them to the host.
async fn forward_stdin(handle: LifecycleHandle, frame: Option<FrameSize>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_event(&line) {
            Ok(event) => {
                let sent = match frame {
                    Some(frame) => handle.send_input_in_frame(frame, event).await,
                    None => handle.send_input(event).await,
                };
                if sent.is_err() {
                    break;
                }
            }
            Err(e) => warn!("ignoring input line: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_peer_config_defaults() {
        // Arrange: only the required subcommand
        let cli = Cli::parse_from(["deskshare-peer", "join", "AB2CDE"]);

        // Act
        let config = cli.peer_config().unwrap();

        // Assert
        assert_eq!(config, PeerConfig::default());
    }

    #[test]
    fn test_cli_host_subcommand_with_loop() {
        let cli = Cli::parse_from(["deskshare-peer", "host", "--source", "screen.ivf", "--loop"]);
        match cli.command {
            Command::Host { source, looping } => {
                assert_eq!(source, PathBuf::from("screen.ivf"));
                assert!(looping);
            }
            other => panic!("expected host, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_join_takes_code() {
        let cli = Cli::parse_from(["deskshare-peer", "join", "XY7ZQ9"]);
        assert!(matches!(
            cli.command,
            Command::Join { ref code, frame: None } if code == "XY7ZQ9"
        ));
    }

    #[test]
    fn test_cli_join_frame_parses() {
        let cli = Cli::parse_from(["deskshare-peer", "join", "XY7ZQ9", "--frame", "1280x720"]);
        match cli.command {
            Command::Join { frame, .. } => assert_eq!(frame, Some(FrameSize::new(1280, 720))),
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_endpoint_and_timeout_overrides() {
        let cli = Cli::parse_from([
            "deskshare-peer",
            "--api",
            "http://10.0.0.2:8081/",
            "--signaling",
            "ws://10.0.0.2:8082",
            "--negotiation-timeout",
            "5",
            "--max-restarts",
            "1",
            "join",
            "AB2CDE",
        ]);
        let config = cli.peer_config().unwrap();
        assert_eq!(config.api_base, "http://10.0.0.2:8081");
        assert_eq!(config.signaling_url, "ws://10.0.0.2:8082");
        assert_eq!(config.negotiation.timeout, Duration::from_secs(5));
        assert_eq!(config.negotiation.retry.max_restarts, 1);
    }

    #[test]
    fn test_cli_zero_timeout_is_rejected() {
        let cli = Cli::parse_from(["deskshare-peer", "--request-timeout", "0", "join", "AB2CDE"]);
        assert!(cli.peer_config().is_err());
    }

    #[test]
    fn test_cli_viewport_parses() {
        let cli = Cli::parse_from(["deskshare-peer", "--viewport", "1280x720", "join", "AB2CDE"]);
        assert_eq!(cli.peer_config().unwrap().viewport, FrameSize::new(1280, 720));
    }

    #[test]
    fn test_parse_viewport_rejects_garbage() {
        assert!(parse_viewport("1280").is_err());
        assert!(parse_viewport("0x720").is_err());
        assert!(parse_viewport("wide x tall").is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["deskshare-peer"]).is_err());
    }
}
