//! Feed Transport Port (Driven Port)
//!
//! Interface for opening an authenticated streaming session to the feed.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::AccessToken;

/// Newline-delimited frames from one streaming session.
///
/// The stream ends when the remote side closes the session.
pub type FrameStream = BoxStream<'static, Result<String, ConnectionError>>;

/// Connection-level failures. All are recovered by reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Could not establish the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Feed answered with a non-success status.
    #[error("feed returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Feed rejected the token (401/403).
    #[error("feed rejected access token (HTTP {status})")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
    },

    /// No frame arrived within the read timeout.
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),

    /// Session setup did not complete within the connect timeout.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Body read failed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote side ended the stream.
    #[error("stream closed by remote")]
    Closed,
}

impl ConnectionError {
    /// Whether the held token should be discarded before reconnecting.
    #[must_use]
    pub const fn invalidates_token(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Http { .. } => "http",
            Self::Unauthorized { .. } => "unauthorized",
            Self::ReadTimeout(_) => "read_timeout",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::Transport(_) => "transport",
            Self::Closed => "closed",
        }
    }
}

/// Port for opening feed sessions.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a streaming session authorized by `token`.
    async fn open(&self, token: &AccessToken) -> Result<FrameStream, ConnectionError>;
}
