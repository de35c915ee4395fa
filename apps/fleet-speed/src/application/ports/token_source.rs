//! Token Source Port (Driven Port)
//!
//! Interface for obtaining short-lived access tokens from the provider.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Longest lifetime trusted from a provider; longer grants are refreshed daily.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 3600);

/// Bearer token with a local expiry instant.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Instant,
}

impl AccessToken {
    /// Create a token that expires `lifetime` from now, capped at
    /// `MAX_TOKEN_LIFETIME`.
    #[must_use]
    pub fn new(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            expires_at: Instant::now() + lifetime.min(MAX_TOKEN_LIFETIME),
        }
    }

    /// Token value for the `Authorization` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Instant after which the provider will reject the token.
    #[must_use]
    pub const fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the token expires within `margin` of now.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        Instant::now()
            .checked_add(margin)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Errors from token acquisition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Provider rejected the client credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Client-side setup problem (bad URL, unbuildable client).
    #[error("auth configuration error: {0}")]
    Configuration(String),

    /// Temporary failure worth retrying.
    #[error("transient auth failure: {0}")]
    Transient(String),

    /// Transient failures persisted past the attempt limit.
    #[error("token acquisition failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last failure message.
        last: String,
    },
}

impl AuthError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Port for fetching access tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a fresh token. Performs exactly one request.
    async fn fetch_token(&self) -> Result<AccessToken, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let token = AccessToken::new("super-secret", DEFAULT_TOKEN_LIFETIME);
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_margin() {
        let token = AccessToken::new("t", Duration::from_secs(120));
        assert!(!token.expires_within(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(token.expires_within(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_lifetimes_are_capped() {
        let token = AccessToken::new("t", Duration::from_secs(u64::MAX));
        assert_eq!(token.expires_at(), Instant::now() + MAX_TOKEN_LIFETIME);
        assert!(!token.expires_within(Duration::from_secs(60)));
        assert!(token.expires_within(Duration::MAX));
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(AuthError::Transient("503".into()).is_retryable());
        assert!(!AuthError::InvalidCredentials("401".into()).is_retryable());
        assert!(!AuthError::Configuration("url".into()).is_retryable());
    }
}
