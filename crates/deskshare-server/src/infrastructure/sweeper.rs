//! Periodic expiry sweep.
//!
//! Lookups and joins evict expired records lazily and hand them to the relay
//! straight away; the sweeper catches records nobody looks at, plus any lazy
//! eviction not yet drained, and disconnects whoever is still attached.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::{EvictedSession, SessionRegistry, SignalingRelay};

/// Runs one sweep and notifies attached transports.
pub fn sweep_once(registry: &SessionRegistry, relay: &SignalingRelay) -> Vec<EvictedSession> {
    let evicted = registry.sweep();
    relay.evict(&evicted);
    evicted
}

/// Sweeps every `period` until `shutdown` turns `true`.
pub async fn run_sweeper(
    registry: Arc<SessionRegistry>,
    relay: Arc<SignalingRelay>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing can have expired yet.
    ticker.tick().await;

    info!("sweeper running every {}s", period.as_secs());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = sweep_once(&registry, &relay);
                debug!("sweep pass evicted {} session(s)", evicted.len());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("sweeper stopping");
                    break;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{ManualClock, Outbound, RandomCodes};
    use chrono::Utc;
    use deskshare_core::{ClientMessage, Role, ServerMessage};

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_session_and_notifies_host() {
        // Arrange
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(SessionRegistry::with_sources(
            TTL,
            100,
            clock.clone(),
            Arc::new(RandomCodes),
        ));
        let relay = Arc::new(SignalingRelay::new(Arc::clone(&registry), Vec::new()));
        let code = registry.create_session().unwrap().code;
        let (host, mut rx) = relay.connect();
        relay.handle_message(
            host,
            ClientMessage::JoinSession {
                session_code: code.to_string(),
                role: Role::Host,
            },
        );
        let _joined = rx.recv().await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_sweeper(
            Arc::clone(&registry),
            Arc::clone(&relay),
            Duration::from_secs(10),
            stop_rx,
        ));

        // Act: pass expiry, then let one sweep period elapse.
        clock.advance(TTL + Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(11)).await;

        // Assert
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Message(ServerMessage::SessionExpired {
                session_code: code.to_string(),
            }))
        );
        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert!(registry.is_empty());

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_sweep_once_leaves_live_sessions() {
        let registry = Arc::new(SessionRegistry::new(TTL, 100));
        let relay = SignalingRelay::new(Arc::clone(&registry), Vec::new());
        registry.create_session().unwrap();
        assert!(sweep_once(&registry, &relay).is_empty());
        assert_eq!(registry.len(), 1);
    }
}
