//! REST API: session creation, lookup, and health.
//!
//! - `GET    /api/health`          liveness probe
//! - `POST   /api/session`         create a session, returns its code
//! - `GET    /api/session/:code`   look a session up by code
//! - `DELETE /api/session/:code`   close a session and disconnect its peers
//!
//! All bodies are JSON with camelCase fields.  Failures carry `{error}`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use deskshare_core::{SessionCode, SessionError, SessionStatus};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::{SessionRegistry, SignalingRelay};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub relay: Arc<SignalingRelay>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, relay: Arc<SignalingRelay>) -> Self {
        Self { registry, relay }
    }
}

// ── Bodies ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub session_code: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub expires_at: String,
    pub has_host: bool,
    pub has_client: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Builds the API router.
pub fn build_router(state: AppState) -> Router {
    // Browser frontends are served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/session", post(create_session))
        .route("/api/session/:code", get(get_session).delete(delete_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the API on `addr` until `shutdown` turns `true`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_http_api(
    addr: SocketAddr,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP API on {addr}"))?;
    info!("REST API listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("HTTP API server failed")
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: iso8601(Utc::now()),
    })
}

async fn create_session(State(state): State<AppState>) -> Response {
    let created = state.registry.create_session();
    // A reissued code may have displaced an expired record with peers on it.
    state.relay.evict_lapsed();
    match created {
        Ok(session) => (
            StatusCode::OK,
            Json(CreatedSession {
                session_id: session.session_id,
                session_code: session.code.to_string(),
                expires_at: iso8601(session.expires_at),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("session creation failed: {e}");
            error_response(&e)
        }
    }
}

async fn get_session(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let lookup = SessionCode::parse(&raw).and_then(|code| state.registry.get_session(&code));
    if matches!(lookup, Err(SessionError::Expired)) {
        state.relay.evict_lapsed();
    }
    match lookup {
        Ok(session) => (
            StatusCode::OK,
            Json(SessionInfo {
                session_id: session.session_id,
                status: session.status,
                expires_at: iso8601(session.expires_at),
                has_host: session.has_host(),
                has_client: session.has_client(),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn delete_session(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let closed = SessionCode::parse(&raw).and_then(|code| state.registry.close_session(&code));
    match closed {
        Ok(evicted) => {
            state.relay.evict(std::slice::from_ref(&evicted));
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// HTTP status for a registry failure.
///
/// A malformed code is reported as not found: no session can have it.
fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::NotFound | SessionError::InvalidCode(_) => StatusCode::NOT_FOUND,
        SessionError::Expired => StatusCode::GONE,
        SessionError::RoleConflict { .. } => StatusCode::CONFLICT,
        SessionError::CodespaceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &SessionError) -> Response {
    let error = match err {
        SessionError::InvalidCode(_) => SessionError::NotFound.to_string(),
        other => other.to_string(),
    };
    (status_for(err), Json(ErrorBody { error })).into_response()
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use deskshare_core::Role;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&SessionError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&SessionError::InvalidCode("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&SessionError::Expired), StatusCode::GONE);
        assert_eq!(
            status_for(&SessionError::RoleConflict { role: Role::Host }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&SessionError::CodespaceExhausted { attempts: 100 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_iso8601_uses_millis_and_z() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(iso8601(t), "2026-03-04T05:06:07.000Z");
    }

    #[test]
    fn test_session_info_serializes_camel_case() {
        let info = SessionInfo {
            session_id: Uuid::nil(),
            status: SessionStatus::Active,
            expires_at: "2026-01-01T00:00:00.000Z".into(),
            has_host: true,
            has_client: false,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["hasHost"], true);
        assert_eq!(json["hasClient"], false);
        assert!(json.get("sessionId").is_some());
    }
}
