//! REST client for the session service.
//!
//! | Call                        | Success | Mapped failures              |
//! |-----------------------------|---------|------------------------------|
//! | `POST /api/session`         | 200     | anything else → Unavailable  |
//! | `GET  /api/session/{code}`  | 200     | 404 → NotFound, 410 → Expired |
//!
//! Other error statuses carry `{"error": "<text>"}`; the text is mapped back
//! with [`SessionError::from_server_message`].

use std::time::Duration;

use async_trait::async_trait;
use deskshare_core::{SessionCode, SessionError};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::application::ports::{CreatedSession, DirectoryError, SessionDirectory, SessionInfo};

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("HTTP client setup failed: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<ApiClientError> for DirectoryError {
    fn from(err: ApiClientError) -> Self {
        DirectoryError::Unavailable(err.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Creates a client for the API at `base` (e.g. `http://127.0.0.1:3001`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::Build`] if the TLS backend cannot be set up.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ApiClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiClientError::Build)?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, DirectoryError> {
        req.send().await.map_err(|source| {
            ApiClientError::Request {
                url: url.to_string(),
                source,
            }
            .into()
        })
    }
}

/// Turns a non-success response into a [`DirectoryError`].
async fn failure(resp: reqwest::Response) -> DirectoryError {
    let status = resp.status();
    match status {
        StatusCode::NOT_FOUND => SessionError::NotFound.into(),
        StatusCode::GONE => SessionError::Expired.into(),
        _ => match resp.json::<ErrorBody>().await {
            Ok(body) if status.is_client_error() => {
                SessionError::from_server_message(&body.error).into()
            }
            Ok(body) => DirectoryError::Unavailable(format!("{status}: {}", body.error)),
            Err(_) => DirectoryError::Unavailable(format!("unexpected status {status}")),
        },
    }
}

#[async_trait]
impl SessionDirectory for ApiClient {
    async fn create_session(&self) -> Result<CreatedSession, DirectoryError> {
        let url = self.url("/api/session");
        debug!("POST {url}");
        let resp = self.send(self.http.post(&url), &url).await?;
        if !resp.status().is_success() {
            return Err(failure(resp).await);
        }
        resp.json::<CreatedSession>()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("bad create response: {e}")))
    }

    async fn lookup_session(&self, code: &SessionCode) -> Result<SessionInfo, DirectoryError> {
        let url = self.url(&format!("/api/session/{code}"));
        debug!("GET {url}");
        let resp = self.send(self.http.get(&url), &url).await?;
        if !resp.status().is_success() {
            return Err(failure(resp).await);
        }
        resp.json::<SessionInfo>()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("bad lookup response: {e}")))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use deskshare_core::SessionStatus;
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn lookup(Path(code): Path<String>) -> (AxumStatus, Json<serde_json::Value>) {
        match code.as_str() {
            "AB2CDE" => (
                AxumStatus::OK,
                Json(json!({
                    "sessionId": "6f1c2a4e-2b8f-4e0b-9a55-0d3f1e7c9b21",
                    "status": "waiting",
                    "expiresAt": "2026-01-01T10:00:00.000Z",
                    "hasHost": false,
                    "hasClient": false,
                })),
            ),
            "GNE222" => (AxumStatus::GONE, Json(json!({ "error": "session expired" }))),
            "BUSY22" => (
                AxumStatus::CONFLICT,
                Json(json!({ "error": "host already connected to this session" })),
            ),
            _ => (AxumStatus::NOT_FOUND, Json(json!({ "error": "session not found" }))),
        }
    }

    async fn create() -> Json<serde_json::Value> {
        Json(json!({
            "sessionId": "6f1c2a4e-2b8f-4e0b-9a55-0d3f1e7c9b21",
            "sessionCode": "XY7ZQ9",
            "expiresAt": "2026-01-01T10:00:00.000Z",
        }))
    }

    async fn fake_api() -> ApiClient {
        let app = Router::new()
            .route("/api/session", post(create))
            .route("/api/session/:code", get(lookup));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap()
    }

    fn code(raw: &str) -> SessionCode {
        SessionCode::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_create_session_parses_body() {
        // Arrange
        let client = fake_api().await;

        // Act
        let created = client.create_session().await.unwrap();

        // Assert
        assert_eq!(created.code.as_str(), "XY7ZQ9");
    }

    #[tokio::test]
    async fn test_lookup_existing_session() {
        let client = fake_api().await;

        let info = client.lookup_session(&code("AB2CDE")).await.unwrap();

        assert_eq!(info.status, SessionStatus::Waiting);
        assert!(!info.has_host);
    }

    #[tokio::test]
    async fn test_lookup_maps_status_codes() {
        let client = fake_api().await;

        assert_eq!(
            client.lookup_session(&code("ZZZZZZ")).await,
            Err(DirectoryError::Session(SessionError::NotFound))
        );
        assert_eq!(
            client.lookup_session(&code("GNE222")).await,
            Err(DirectoryError::Session(SessionError::Expired))
        );
    }

    #[tokio::test]
    async fn test_client_error_body_maps_to_session_error() {
        let client = fake_api().await;

        let result = client.lookup_session(&code("BUSY22")).await;

        assert_eq!(
            result,
            Err(DirectoryError::Session(SessionError::RoleConflict {
                role: deskshare_core::Role::Host
            }))
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ApiClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();

        let result = client.create_session().await;

        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
    }
}
