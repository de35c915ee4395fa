//! Feed State
//!
//! Connection status and ingest counters shared between the ingestor
//! (sole writer) and the health endpoint.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Ingestor connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Obtaining an access token.
    Authenticating,
    /// Session open, no frame received yet.
    Connected,
    /// Frames flowing.
    Streaming,
    /// Waiting to reconnect after a session ended.
    Reconnecting,
    /// Ingestor stopped on a fatal error.
    Failed,
}

impl ConnectionState {
    /// State name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of `FeedState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Current connection state.
    pub state: ConnectionState,
    /// When the last session was opened.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last error, cleared on the next successful session.
    pub error_message: Option<String>,
    /// Reconnect attempts since the last session delivered data.
    pub reconnect_attempts: u32,
    /// Position messages decoded.
    pub messages_received: u64,
    /// Frames that failed to decode.
    pub decode_failures: u64,
    /// Messages evicted by the drop-oldest policy.
    pub messages_dropped: u64,
    /// Non-position frames skipped.
    pub frames_skipped: u64,
}

/// Shared connection status and counters.
#[derive(Debug, Default)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    decode_failures: AtomicU64,
    messages_dropped: AtomicU64,
    frames_skipped: AtomicU64,
}

impl FeedState {
    /// Create a disconnected state with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        match state {
            ConnectionState::Connected => {
                *self.last_connected_at.write() = Some(Utc::now());
            }
            ConnectionState::Streaming => {
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                *self.error_message.write() = None;
            }
            _ => {}
        }
    }

    /// Record an error without changing state.
    pub fn record_error(&self, message: String) {
        *self.error_message.write() = Some(message);
    }

    /// Enter `Failed` with a message.
    pub fn set_failed(&self, message: String) {
        *self.state.write() = ConnectionState::Failed;
        *self.error_message.write() = Some(message);
    }

    /// Increment reconnect attempts.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment decoded position messages.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment decode failures.
    pub fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment evicted messages.
    pub fn increment_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment skipped non-position frames.
    pub fn increment_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether frames are flowing.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    /// Position messages decoded so far.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Decode failures so far.
    #[must_use]
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Messages evicted so far.
    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Reconnect attempts since data last flowed.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Copy everything out.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            error_message: self.error_message.read().clone(),
            reconnect_attempts: self.reconnect_attempts(),
            messages_received: self.messages_received(),
            decode_failures: self.decode_failures(),
            messages_dropped: self.messages_dropped(),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
        }
    }
}
