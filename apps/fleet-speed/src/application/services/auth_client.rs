//! Auth Client
//!
//! Holds the current access token and refreshes it before it expires.
//! Retryable failures are retried with backoff up to a fixed number of
//! attempts; anything else surfaces immediately.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{AccessToken, AuthError, TokenSource};
use crate::application::services::backoff::{Backoff, BackoffConfig};
use crate::infrastructure::metrics;

/// Token refresh settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Refresh when the held token expires within this margin.
    pub refresh_margin: Duration,
    /// Total fetch attempts per acquisition (at least 1).
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub retry: BackoffConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(60),
            max_attempts: 5,
            retry: BackoffConfig {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                ..BackoffConfig::default()
            },
        }
    }
}

/// Access token cache in front of a `TokenSource`.
pub struct AuthClient {
    source: Arc<dyn TokenSource>,
    config: AuthConfig,
    token: Option<AccessToken>,
}

impl AuthClient {
    /// Create a client with no token held.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, config: AuthConfig) -> Self {
        Self {
            source,
            config,
            token: None,
        }
    }

    /// Fetch a fresh token, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the source's error for non-retryable failures, or
    /// `AuthError::RetriesExhausted` once the attempt limit is reached.
    pub async fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = Backoff::new(self.config.retry.clone());
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.source.fetch_token().await {
                Ok(token) => {
                    metrics::record_auth_refresh("success");
                    tracing::info!(attempts, "Access token acquired");
                    return Ok(token);
                }
                Err(e) if !e.is_retryable() => {
                    metrics::record_auth_refresh("rejected");
                    tracing::error!(error = %e, "Token request rejected");
                    return Err(e);
                }
                Err(e) if attempts >= max_attempts => {
                    metrics::record_auth_refresh("exhausted");
                    return Err(AuthError::RetriesExhausted {
                        attempts,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    metrics::record_auth_refresh("retry");
                    let delay = backoff.next_delay().unwrap_or(self.config.retry.max_delay);
                    tracing::warn!(
                        error = %e,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Token request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Return the held token, refreshing it if it expires within the margin.
    ///
    /// # Errors
    ///
    /// Propagates `acquire_token` failures.
    pub async fn ensure_valid(&mut self) -> Result<AccessToken, AuthError> {
        if let Some(token) = &self.token
            && !token.expires_within(self.config.refresh_margin)
        {
            return Ok(token.clone());
        }

        if self.token.is_some() {
            tracing::debug!("Access token near expiry, refreshing");
        }
        let token = self.acquire_token().await?;
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Drop the held token so the next `ensure_valid` fetches a new one.
    pub fn invalidate(&mut self) {
        if self.token.take().is_some() {
            tracing::info!("Access token invalidated");
        }
    }

    /// Whether a token is currently held.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("config", &self.config)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockTokenSource;

    fn config(max_attempts: u32) -> AuthConfig {
        AuthConfig {
            refresh_margin: Duration::from_secs(60),
            max_attempts,
            retry: BackoffConfig {
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts: 0,
            },
        }
    }

    fn client(source: MockTokenSource, max_attempts: u32) -> AuthClient {
        AuthClient::new(Arc::new(source), config(max_attempts))
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_reused_within_margin() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch_token()
            .times(1)
            .returning(|| Ok(AccessToken::new("t1", Duration::from_secs(3600))));
        let mut auth = client(source, 3);

        let first = auth.ensure_valid().await.unwrap();
        tokio::time::advance(Duration::from_secs(1800)).await;
        let second = auth.ensure_valid().await.unwrap();

        assert_eq!(first.secret(), "t1");
        assert_eq!(second.secret(), "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_refreshed_near_expiry() {
        let mut source = MockTokenSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(AccessToken::new("t1", Duration::from_secs(120))));
        source
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(AccessToken::new("t2", Duration::from_secs(120))));
        let mut auth = client(source, 3);

        assert_eq!(auth.ensure_valid().await.unwrap().secret(), "t1");
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(auth.ensure_valid().await.unwrap().secret(), "t2");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mut source = MockTokenSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_fetch_token()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Err(AuthError::Transient("503".into())));
        source
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(AccessToken::new("t", Duration::from_secs(3600))));
        let auth = client(source, 5);

        assert_eq!(auth.acquire_token().await.unwrap().secret(), "t");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_credentials_fail_fast() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch_token()
            .times(1)
            .returning(|| Err(AuthError::InvalidCredentials("401".into())));
        let auth = client(source, 5);

        assert!(matches!(
            auth.acquire_token().await,
            Err(AuthError::InvalidCredentials(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_capped() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch_token()
            .times(3)
            .returning(|| Err(AuthError::Transient("timeout".into())));
        let auth = client(source, 3);

        match auth.acquire_token().await {
            Err(AuthError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("timeout"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refresh() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch_token()
            .times(2)
            .returning(|| Ok(AccessToken::new("t", Duration::from_secs(3600))));
        let mut auth = client(source, 3);

        auth.ensure_valid().await.unwrap();
        assert!(auth.has_token());
        auth.invalidate();
        assert!(!auth.has_token());
        auth.ensure_valid().await.unwrap();
    }
}
