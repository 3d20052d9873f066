//! Peer configuration types.
//!
//! [`PeerConfig`] holds the endpoints and timeouts of one peer process;
//! [`NegotiationConfig`] holds the transport handshake limits and the restart
//! policy.  Both are plain structs filled in by the CLI layer.

use std::time::Duration;

use deskshare_core::FrameSize;

/// Endpoints, timeouts, and the local viewport of a peer.
///
/// # Example
///
/// ```rust
/// use deskshare_peer::domain::PeerConfig;
///
/// let cfg = PeerConfig::default();
/// assert_eq!(cfg.api_base, "http://127.0.0.1:3001");
/// assert_eq!(cfg.signaling_url, "ws://127.0.0.1:3002");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PeerConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_base: String,

    /// URL of the signaling WebSocket.
    pub signaling_url: String,

    /// Upper bound for one REST call.
    pub request_timeout: Duration,

    /// Upper bound for opening the signaling WebSocket.
    pub connect_timeout: Duration,

    /// Local surface that received pointer events are mapped onto.
    pub viewport: FrameSize,

    pub negotiation: NegotiationConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:3001".to_string(),
            signaling_url: "ws://127.0.0.1:3002".to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            viewport: FrameSize::new(1920, 1080),
            negotiation: NegotiationConfig::default(),
        }
    }
}

/// Limits for one transport handshake and for restarting it.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationConfig {
    /// A handshake that has not reached `Connected` by then is failed.
    pub timeout: Duration,

    pub retry: RetryPolicy,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded exponential backoff between negotiation restarts.
///
/// ```text
/// attempt:  1    2    3    4    5
/// delay:    1s   2s   4s   8s   8s   (base 1s, cap 8s)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_restarts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before restart number `attempt` (1-based), or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_restarts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
