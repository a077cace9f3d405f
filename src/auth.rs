use serde::Deserialize;
use std::sync::Arc;

use crate::config::ResolvedAuth;
use crate::error::AuthError;
use crate::http::{HttpRequest, Transport};

pub const SCOPES: &[&str] = &["user-modify-playback-state", "user-read-currently-playing"];

/// Result of a successful refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds, when the auth server reports it
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Some servers rotate the refresh token on every exchange
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Talks to the auth server that brokers the Spotify login.
pub struct AuthClient {
    transport: Arc<dyn Transport>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// URL the user's browser is sent to in order to grant access.
    pub fn build_authorization_url(config: &ResolvedAuth) -> String {
        format!(
            "{}/login?scope={}&client_id={}&redirect_uri={}",
            config.auth_server_uri,
            SCOPES.join("+"),
            encode_uri_component(&config.client_id),
            encode_uri_component(&config.redirect_uri),
        )
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn exchange_refresh_token(
        &self,
        config: &ResolvedAuth,
        refresh_token: &str,
    ) -> Result<TokenGrant, AuthError> {
        let url = format!(
            "{}/refresh?clientId={}&refreshToken={}",
            config.auth_server_uri,
            encode_uri_component(&config.client_id),
            encode_uri_component(refresh_token),
        );

        let response = self.transport.send(HttpRequest::get(url)).await?;

        if !response.is_success() {
            tracing::warn!(status = response.status, "Refresh exchange rejected");
            return Err(AuthError::ExchangeFailed(response.status, response.body));
        }

        match serde_json::from_str::<TokenGrant>(&response.body) {
            Ok(grant) if !grant.access_token.is_empty() => Ok(grant),
            _ => {
                tracing::warn!(status = response.status, "Refresh response missing access_token");
                Err(AuthError::ExchangeFailed(response.status, response.body))
            }
        }
    }
}

/// Percent-encode like JavaScript's `encodeURIComponent`: ASCII
/// alphanumerics and `-_.!~*'()` pass through, everything else is escaped.
pub fn encode_uri_component(input: &str) -> String {
    // urlencoding leaves only alphanumerics and `-_.~`; every `%` it emits
    // starts an escape, so restoring the remaining marks is unambiguous.
    urlencoding::encode(input)
        .replace("%21", "!")
        .replace("%2A", "*")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::mock::MockTransport;

    fn resolved(redirect_uri: &str) -> ResolvedAuth {
        ResolvedAuth {
            auth_server_uri: "https://auth.example.com".to_string(),
            client_id: "client123".to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    fn redirect_param(url: &str) -> &str {
        url.split("redirect_uri=").nth(1).unwrap()
    }

    #[test]
    fn test_encode_uri_component() {
        assert_eq!(encode_uri_component("abcXYZ019"), "abcXYZ019");
        assert_eq!(encode_uri_component("-_.!~*'()"), "-_.!~*'()");
        assert_eq!(encode_uri_component("a b/c?d=e&f#g"), "a%20b%2Fc%3Fd%3De%26f%23g");
        assert_eq!(encode_uri_component("100%"), "100%25");
        assert_eq!(encode_uri_component("%21"), "%2521");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
    }

    #[test]
    fn test_authorization_url_shape() {
        let url = AuthClient::build_authorization_url(&resolved("mediakeys://callback"));
        assert_eq!(
            url,
            "https://auth.example.com/login?scope=user-modify-playback-state+user-read-currently-playing\
             &client_id=client123&redirect_uri=mediakeys%3A%2F%2Fcallback"
        );
    }

    #[test]
    fn test_redirect_uri_roundtrips() {
        let samples = [
            "mediakeys-spotify-connect://callback",
            "http://localhost:8080/cb?x=1&y=two words",
            "weird!~*'()-_.chars#frag",
            "100% ünïcödé/🎵",
            "%2F already-encoded",
        ];
        for sample in samples {
            let url = AuthClient::build_authorization_url(&resolved(sample));
            let encoded = redirect_param(&url);
            assert!(!encoded.contains('&') && !encoded.contains('#') && !encoded.contains(' '));
            assert_eq!(urlencoding::decode(encoded).unwrap(), sample);
        }
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let transport = Arc::new(MockTransport::new().respond(200, r#"{"access_token":"NEW","expires_in":3600}"#));
        let client = AuthClient::new(transport.clone());

        let grant = client
            .exchange_refresh_token(&resolved("mediakeys://cb"), "REFRESH/+")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "NEW");
        assert_eq!(grant.expires_in, Some(3600));
        assert!(grant.refresh_token.is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://auth.example.com/refresh?clientId=client123&refreshToken=REFRESH%2F%2B"
        );
        assert!(requests[0].bearer.is_none());
    }

    #[tokio::test]
    async fn test_exchange_server_error() {
        let transport = Arc::new(MockTransport::new().respond(500, "boom"));
        let client = AuthClient::new(transport);

        let result = client.exchange_refresh_token(&resolved("x://y"), "r").await;
        assert_eq!(result, Err(AuthError::ExchangeFailed(500, "boom".to_string())));
    }

    #[tokio::test]
    async fn test_exchange_missing_field() {
        let transport = Arc::new(MockTransport::new().respond(200, r#"{"token":"nope"}"#));
        let client = AuthClient::new(transport);

        let result = client.exchange_refresh_token(&resolved("x://y"), "r").await;
        assert!(matches!(result, Err(AuthError::ExchangeFailed(200, _))));
    }

    #[tokio::test]
    async fn test_exchange_not_json() {
        let transport = Arc::new(MockTransport::new().respond(200, "<html>"));
        let client = AuthClient::new(transport);

        let result = client.exchange_refresh_token(&resolved("x://y"), "r").await;
        assert_eq!(result, Err(AuthError::ExchangeFailed(200, "<html>".to_string())));
    }

    #[tokio::test]
    async fn test_exchange_network_failure() {
        let transport = Arc::new(MockTransport::new().fail(TransportError::Timeout));
        let client = AuthClient::new(transport);

        let result = client.exchange_refresh_token(&resolved("x://y"), "r").await;
        assert!(matches!(result, Err(AuthError::NetworkFailure(_))));
    }
}
