use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Method, Transport};
use crate::session::SessionManager;

const CURRENTLY_PLAYING: &str = "/v1/me/player/currently-playing";
const PLAY: &str = "/v1/me/player/play";
const PAUSE: &str = "/v1/me/player/pause";
const NEXT: &str = "/v1/me/player/next";
const PREVIOUS: &str = "/v1/me/player/previous";

/// What `toggle` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Paused,
    Resumed,
}

impl std::fmt::Display for Toggled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Toggled::Paused => write!(f, "paused"),
            Toggled::Resumed => write!(f, "playing"),
        }
    }
}

/// A 2xx response; `json` is `None` for an empty body (e.g. 204).
#[derive(Debug)]
struct ApiResponse {
    status: u16,
    body: String,
    json: Option<Value>,
}

/// Playback intents against the Spotify Web API.
pub struct PlaybackController {
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    api_base: String,
}

impl PlaybackController {
    pub fn new(session: Arc<SessionManager>, transport: Arc<dyn Transport>, api_base: &str) -> Self {
        Self {
            session,
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Pause if something is playing, otherwise resume. Never guesses: a
    /// failed status check fails the toggle.
    pub async fn toggle(&self) -> Result<Toggled, ApiError> {
        if self.currently_playing().await? {
            self.call(Method::Put, PAUSE).await?;
            Ok(Toggled::Paused)
        } else {
            self.call(Method::Put, PLAY).await?;
            Ok(Toggled::Resumed)
        }
    }

    pub async fn next(&self) -> Result<(), ApiError> {
        self.call(Method::Post, NEXT).await.map(|_| ())
    }

    pub async fn previous(&self) -> Result<(), ApiError> {
        self.call(Method::Post, PREVIOUS).await.map(|_| ())
    }

    /// Whether the account is currently playing. 204 means nothing is loaded.
    pub async fn currently_playing(&self) -> Result<bool, ApiError> {
        let response = self.call(Method::Get, CURRENTLY_PLAYING).await?;
        match response.json {
            None => Ok(false),
            Some(json) => json
                .get("is_playing")
                .and_then(Value::as_bool)
                .ok_or(ApiError::UnexpectedResponse(response.status, response.body)),
        }
    }

    async fn call(&self, method: Method, endpoint: &str) -> Result<ApiResponse, ApiError> {
        let token = self
            .session
            .access_token()
            .await
            .ok_or(ApiError::NotAuthenticated)?;

        let request = HttpRequest {
            method,
            url: format!("{}{}", self.api_base, endpoint),
            bearer: Some(token),
        };
        let HttpResponse { status, body } = self.transport.send(request).await.inspect_err(|e| {
            tracing::warn!(%method, endpoint, error = %e, "Spotify request failed");
        })?;

        if status == 401 {
            tracing::info!(endpoint, "Access token rejected");
            self.session.mark_expired().await;
            return Err(ApiError::UnexpectedResponse(status, body));
        }
        if !(200..300).contains(&status) {
            tracing::warn!(%method, endpoint, status, "Unexpected Spotify status");
            return Err(ApiError::UnexpectedResponse(status, body));
        }

        let json = if body.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&body) {
                Ok(v) => Some(v),
                Err(_) => return Err(ApiError::UnexpectedResponse(status, body)),
            }
        };

        tracing::debug!(%method, endpoint, status, "Spotify request ok");
        Ok(ApiResponse { status, body, json })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthClient;
    use crate::config::AuthorizationConfig;
    use crate::error::TransportError;
    use crate::http::mock::MockTransport;
    use crate::session::SessionState;
    use crate::shell::recording::RecordingShell;
    use crate::token_store::TokenStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        transport: Arc<MockTransport>,
        session: Arc<SessionManager>,
        controller: PlaybackController,
    }

    async fn fixture(transport: MockTransport, logged_in: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(transport);
        let session = Arc::new(SessionManager::new(
            AuthorizationConfig::new("https://auth.example.com", "client123", "mk://cb"),
            AuthClient::new(transport.clone()),
            TokenStore::new(dir.path()),
            Arc::new(RecordingShell::new()),
        ));
        if logged_in {
            session.handle_redirect("mk://cb#access_token=TOKEN").await.unwrap();
        }
        let controller = PlaybackController::new(session.clone(), transport.clone(), "https://api.spotify.com");
        Fixture {
            _dir: dir,
            transport,
            session,
            controller,
        }
    }

    #[tokio::test]
    async fn test_toggle_without_token_makes_no_requests() {
        let f = fixture(MockTransport::new(), false).await;

        assert_eq!(f.controller.toggle().await, Err(ApiError::NotAuthenticated));
        assert_eq!(f.controller.next().await, Err(ApiError::NotAuthenticated));
        assert_eq!(f.controller.previous().await, Err(ApiError::NotAuthenticated));
        assert_eq!(f.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_pauses_when_playing() {
        let transport = MockTransport::new()
            .respond(200, r#"{"is_playing": true, "item": {"name": "Song"}}"#)
            .respond(204, "");
        let f = fixture(transport, true).await;

        assert_eq!(f.controller.toggle().await, Ok(Toggled::Paused));

        let requests = f.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url, "https://api.spotify.com/v1/me/player/currently-playing");
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[1].url, "https://api.spotify.com/v1/me/player/pause");
        assert!(requests.iter().all(|r| r.bearer.as_deref() == Some("TOKEN")));
    }

    #[tokio::test]
    async fn test_toggle_plays_when_paused() {
        let transport = MockTransport::new()
            .respond(200, r#"{"is_playing": false}"#)
            .respond(204, "");
        let f = fixture(transport, true).await;

        assert_eq!(f.controller.toggle().await, Ok(Toggled::Resumed));

        let requests = f.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[1].url, "https://api.spotify.com/v1/me/player/play");
    }

    #[tokio::test]
    async fn test_toggle_fails_when_status_check_fails() {
        let f = fixture(MockTransport::new().respond(502, "bad gateway"), true).await;

        assert_eq!(
            f.controller.toggle().await,
            Err(ApiError::UnexpectedResponse(502, "bad gateway".to_string()))
        );
        assert_eq!(f.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_nothing_playing_is_not_playing() {
        let f = fixture(MockTransport::new().respond(204, ""), true).await;
        assert_eq!(f.controller.currently_playing().await, Ok(false));
    }

    #[tokio::test]
    async fn test_status_without_is_playing_is_unexpected() {
        let f = fixture(MockTransport::new().respond(200, r#"{"device": null}"#), true).await;
        assert_eq!(
            f.controller.currently_playing().await,
            Err(ApiError::UnexpectedResponse(200, r#"{"device": null}"#.to_string()))
        );
    }

    #[tokio::test]
    async fn test_non_json_body_is_unexpected() {
        let f = fixture(MockTransport::new().respond(200, "<html>oops</html>"), true).await;
        assert_eq!(
            f.controller.next().await,
            Err(ApiError::UnexpectedResponse(200, "<html>oops</html>".to_string()))
        );
    }

    #[tokio::test]
    async fn test_next_and_previous_endpoints() {
        let transport = MockTransport::new().respond(204, "").respond(204, "");
        let f = fixture(transport, true).await;

        f.controller.next().await.unwrap();
        f.controller.previous().await.unwrap();

        let requests = f.transport.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url, "https://api.spotify.com/v1/me/player/next");
        assert_eq!(requests[1].method, Method::Post);
        assert_eq!(requests[1].url, "https://api.spotify.com/v1/me/player/previous");
    }

    #[tokio::test]
    async fn test_unauthorized_expires_session() {
        let body = r#"{"error":{"status":401,"message":"The access token expired"}}"#;
        let f = fixture(MockTransport::new().respond(401, body), true).await;

        let err = f.controller.next().await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(f.session.access_token().await.is_none());
        assert_eq!(f.session.state().await, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_network_failure() {
        let f = fixture(MockTransport::new().fail(TransportError::Timeout), true).await;
        assert!(matches!(f.controller.previous().await, Err(ApiError::NetworkFailure(_))));
    }
}
