//! OAuth2 Client-Credentials Token Source
//!
//! Exchanges a client id and secret for a bearer token at the BarentsWatch
//! identity endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::application::ports::{AccessToken, AuthError, DEFAULT_TOKEN_LIFETIME, TokenSource};

/// Default BarentsWatch token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://id.barentswatch.no/connect/token";

/// Scope granting access to the live AIS feed.
pub const AIS_SCOPE: &str = "ais";

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Client id and secret. Debug output redacts the secret.
#[derive(Clone)]
pub struct ClientCredentials {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

impl ClientCredentials {
    /// Create credentials.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Token source backed by the client-credentials grant.
#[derive(Debug, Clone)]
pub struct OauthTokenSource {
    client: Client,
    token_url: String,
    credentials: ClientCredentials,
    scope: String,
}

impl OauthTokenSource {
    /// Create a token source for `token_url`.
    #[must_use]
    pub fn new(client: Client, token_url: impl Into<String>, credentials: ClientCredentials) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            credentials,
            scope: AIS_SCOPE.to_string(),
        }
    }

    /// Override the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

#[async_trait]
impl TokenSource for OauthTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("scope", self.scope.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Transient(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate(response.text().await.unwrap_or_default());
            return Err(classify(status, body));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transient(format!("unreadable token response: {e}")))?;

        let secret = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Transient("token response without access_token".into()))?;
        let lifetime = body
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);

        tracing::debug!(expires_in_secs = lifetime.as_secs(), "Access token issued");
        Ok(AccessToken::new(secret, lifetime))
    }
}

fn classify(status: StatusCode, body: String) -> AuthError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AuthError::InvalidCredentials(format!("HTTP {}: {body}", status.as_u16()))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AuthError::Transient(format!("HTTP {}", status.as_u16()))
        }
        s if s.is_server_error() => AuthError::Transient(format!("HTTP {}", s.as_u16())),
        s => AuthError::Configuration(format!("unexpected HTTP {}: {body}", s.as_u16())),
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn source(server: &MockServer) -> OauthTokenSource {
        OauthTokenSource::new(
            Client::new(),
            format!("{}/connect/token", server.uri()),
            ClientCredentials::new("fleet@example.com", "s3cret"),
        )
    }

    #[tokio::test]
    async fn exchanges_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("scope=ais"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "expires_in": 120,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = source(&server).await.fetch_token().await.unwrap();
        assert_eq!(token.secret(), "abc");
        assert!(token.expires_within(Duration::from_secs(121)));
        assert!(!token.expires_within(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn missing_expiry_uses_default_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "abc"})),
            )
            .mount(&server)
            .await;

        let token = source(&server).await.fetch_token().await.unwrap();
        assert!(!token.expires_within(Duration::from_secs(3000)));
    }

    #[tokio::test]
    async fn huge_expiry_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "expires_in": u64::MAX
            })))
            .mount(&server)
            .await;

        let token = source(&server).await.fetch_token().await.unwrap();
        assert!(!token.expires_within(Duration::from_secs(3600)));
        assert!(token.expires_within(crate::application::ports::MAX_TOKEN_LIFETIME));
    }

    #[tokio::test]
    async fn rejected_credentials_are_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_client"}"#))
            .mount(&server)
            .await;

        let err = source(&server).await.fetch_token().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials(ref m) if m.contains("invalid_client")));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source(&server).await.fetch_token().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn response_without_token_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"expires_in": 60})))
            .mount(&server)
            .await;

        let err = source(&server).await.fetch_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Transient(_)));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", ClientCredentials::new("id", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
