//! Stream Ingestor
//!
//! Keeps one authenticated session to the AIS feed open, decodes frames and
//! pushes position reports onto the bounded queue.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ─► Authenticating ─► Connected ─► Streaming
//!                      ▲                │            │
//!                      │                ▼            ▼
//!                      └────────── Reconnecting ◄────┘
//! ```
//!
//! Any session failure goes through `Reconnecting` with exponential backoff.
//! The backoff resets once a session delivers its first frame. Fatal auth
//! errors and an exhausted reconnect budget end the ingestor with an error.
//! Shutdown goes straight to `Disconnected` and drops the queue sender.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AccessToken, AuthError, ConnectionError, FeedTransport, Frame, FrameDecoder,
};
use crate::application::services::aggregator::Received;
use crate::application::services::auth_client::AuthClient;
use crate::application::services::backoff::{Backoff, BackoffConfig};
use crate::application::services::feed_state::{ConnectionState, FeedState};
use crate::application::services::queue::{QueueSender, SendOutcome};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration and Errors
// =============================================================================

/// Ingestor timing settings.
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Limit on opening a session.
    pub connect_timeout: Duration,
    /// Limit on the gap between frames.
    pub read_timeout: Duration,
    /// Delay schedule between sessions.
    pub reconnect: BackoffConfig,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            reconnect: BackoffConfig::default(),
        }
    }
}

/// Fatal ingestor failures.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Token acquisition failed for good.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Too many consecutive failed sessions.
    #[error("gave up after {attempts} reconnect attempts: {last}")]
    ReconnectExhausted {
        /// Reconnect attempts made.
        attempts: u32,
        /// Failure that ended the last session.
        last: ConnectionError,
    },
}

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    QueueClosed,
    Lost(ConnectionError),
}

// =============================================================================
// Stream Ingestor
// =============================================================================

/// Feed reader task.
pub struct StreamIngestor {
    auth: AuthClient,
    transport: Arc<dyn FeedTransport>,
    decoder: Arc<dyn FrameDecoder>,
    queue: QueueSender<Received>,
    state: Arc<FeedState>,
    config: IngestorConfig,
    cancel: CancellationToken,
}

impl StreamIngestor {
    /// Create an ingestor. It owns the only sender of `queue`.
    #[must_use]
    pub fn new(
        auth: AuthClient,
        transport: Arc<dyn FeedTransport>,
        decoder: Arc<dyn FrameDecoder>,
        queue: QueueSender<Received>,
        state: Arc<FeedState>,
        config: IngestorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            auth,
            transport,
            decoder,
            queue,
            state,
            config,
            cancel,
        }
    }

    /// Run until shutdown or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` on a fatal auth failure or when the reconnect
    /// budget is exhausted.
    #[tracing::instrument(name = "ingestor", skip(self))]
    pub async fn run(mut self) -> Result<(), IngestError> {
        let mut backoff = Backoff::new(self.config.reconnect.clone());

        loop {
            self.transition(ConnectionState::Authenticating);
            let token = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.auth.ensure_valid() => result,
            };
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!(error = %e, "Authentication failed, stopping ingestor");
                    self.state.set_failed(e.to_string());
                    return Err(e.into());
                }
            };

            let err = match self.run_session(&token, &mut backoff).await {
                SessionEnd::Shutdown => break,
                SessionEnd::QueueClosed => {
                    tracing::info!("Queue closed, stopping ingestor");
                    break;
                }
                SessionEnd::Lost(err) => err,
            };

            if err.invalidates_token() {
                self.auth.invalidate();
            }
            metrics::record_reconnect(err.kind());
            self.state.record_error(err.to_string());
            self.transition(ConnectionState::Reconnecting);

            let Some(delay) = backoff.next_delay() else {
                let attempts = backoff.attempt_count();
                tracing::error!(attempts, error = %err, "Reconnect attempts exhausted");
                self.state.set_failed(err.to_string());
                return Err(IngestError::ReconnectExhausted {
                    attempts,
                    last: err,
                });
            };
            self.state.increment_reconnect_attempts();
            tracing::warn!(
                error = %err,
                attempt = backoff.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Feed session lost, reconnecting"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(ConnectionState::Disconnected);
        Ok(())
    }

    async fn run_session(&self, token: &AccessToken, backoff: &mut Backoff) -> SessionEnd {
        let connect_timeout = self.config.connect_timeout;
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return SessionEnd::Shutdown,
            result = tokio::time::timeout(connect_timeout, self.transport.open(token)) => result,
        };
        let mut frames = match opened {
            Ok(Ok(frames)) => frames,
            Ok(Err(e)) => return SessionEnd::Lost(e),
            Err(_) => return SessionEnd::Lost(ConnectionError::ConnectTimeout(connect_timeout)),
        };
        self.transition(ConnectionState::Connected);

        let read_timeout = self.config.read_timeout;
        let mut streaming = false;
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Shutdown,
                next = tokio::time::timeout(read_timeout, frames.next()) => next,
            };
            let frame = match next {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => return SessionEnd::Lost(e),
                Ok(None) => return SessionEnd::Lost(ConnectionError::Closed),
                Err(_) => return SessionEnd::Lost(ConnectionError::ReadTimeout(read_timeout)),
            };

            if !streaming {
                streaming = true;
                backoff.reset();
                self.transition(ConnectionState::Streaming);
            }

            if frame.trim().is_empty() {
                continue;
            }
            if let Some(end) = self.handle_frame(&frame).await {
                return end;
            }
        }
    }

    async fn handle_frame(&self, frame: &str) -> Option<SessionEnd> {
        match self.decoder.decode(frame) {
            Ok(Frame::Position(message)) => {
                metrics::record_frame("position");
                self.state.increment_messages();
                match self.queue.send(Received::now(message), &self.cancel).await {
                    SendOutcome::Sent => None,
                    SendOutcome::Displaced => {
                        self.state.increment_dropped();
                        None
                    }
                    SendOutcome::Cancelled => Some(SessionEnd::Shutdown),
                    SendOutcome::Closed => Some(SessionEnd::QueueClosed),
                }
            }
            Ok(other) => {
                metrics::record_frame(other.kind());
                self.state.increment_skipped();
                tracing::trace!(kind = other.kind(), "Skipping non-position frame");
                None
            }
            Err(e) => {
                metrics::record_decode_failure(e.reason());
                self.state.increment_decode_failures();
                tracing::debug!(error = %e, "Dropping undecodable frame");
                None
            }
        }
    }

    fn transition(&self, to: ConnectionState) {
        let from = self.state.state();
        if from != to {
            tracing::info!(%from, %to, "Feed state changed");
        }
        self.state.set_state(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::stream;
    use parking_lot::Mutex;

    use crate::application::ports::{
        DecodeError, FrameStream, MockTokenSource,
    };
    use crate::application::services::auth_client::AuthConfig;
    use crate::application::services::queue::{self, BackpressurePolicy, QueueReceiver};
    use crate::domain::vessel::{AisMessage, Mmsi};

    type Session = Result<Vec<Result<String, ConnectionError>>, ConnectionError>;

    /// Plays back scripted sessions; once exhausted, opens an idle stream.
    struct ScriptedTransport {
        sessions: Mutex<VecDeque<Session>>,
        opens: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(sessions: Vec<Session>) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(sessions.into()),
                opens: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FeedTransport for ScriptedTransport {
        async fn open(&self, _token: &AccessToken) -> Result<FrameStream, ConnectionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.sessions.lock().pop_front() {
                Some(Ok(frames)) => Ok(stream::iter(frames).boxed()),
                Some(Err(e)) => Err(e),
                None => Ok(stream::pending().boxed()),
            }
        }
    }

    /// `mmsi,speed,seconds` lines; `static` yields a static report.
    struct CsvDecoder;

    impl FrameDecoder for CsvDecoder {
        fn decode(&self, frame: &str) -> Result<Frame, DecodeError> {
            if frame == "static" {
                return Ok(Frame::Static(Mmsi::new(257_000_001).unwrap()));
            }
            let parts: Vec<&str> = frame.split(',').collect();
            let [mmsi, speed, secs] = parts.as_slice() else {
                return Err(DecodeError::NotAnObject);
            };
            let invalid = |field| DecodeError::InvalidField {
                field,
                reason: frame.to_string(),
            };
            let mmsi: Mmsi = mmsi.parse().map_err(|_| invalid("mmsi"))?;
            let speed: f64 = speed.parse().map_err(|_| invalid("speed"))?;
            let secs: i64 = secs.parse().map_err(|_| invalid("msgtime"))?;
            let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
            AisMessage::new(mmsi, ts, Some(60.0), Some(5.0), speed, None)
                .map(Frame::Position)
                .map_err(|e| invalid_from(&e))
        }
    }

    fn invalid_from(e: &crate::domain::vessel::VesselDataError) -> DecodeError {
        DecodeError::InvalidField {
            field: "message",
            reason: e.to_string(),
        }
    }

    fn lines(items: &[&str]) -> Session {
        Ok(items.iter().map(|s| Ok((*s).to_string())).collect())
    }

    fn tokens(times: usize) -> MockTokenSource {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch_token()
            .times(times)
            .returning(|| Ok(AccessToken::new("t", Duration::from_secs(3600))));
        source
    }

    fn config(max_attempts: u32) -> IngestorConfig {
        IngestorConfig {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(5),
            reconnect: BackoffConfig {
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts,
            },
        }
    }

    struct Harness {
        rx: QueueReceiver<Received>,
        state: Arc<FeedState>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<Result<(), IngestError>>,
    }

    fn spawn(
        source: MockTokenSource,
        transport: Arc<ScriptedTransport>,
        max_attempts: u32,
    ) -> Harness {
        let (tx, rx) = queue::bounded(16, BackpressurePolicy::Block);
        let state = Arc::new(FeedState::new());
        let cancel = CancellationToken::new();
        let auth = AuthClient::new(Arc::new(source), AuthConfig::default());
        let ingestor = StreamIngestor::new(
            auth,
            transport,
            Arc::new(CsvDecoder),
            tx,
            Arc::clone(&state),
            config(max_attempts),
            cancel.clone(),
        );
        Harness {
            rx,
            state,
            cancel,
            handle: tokio::spawn(ingestor.run()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_positions_and_skips_the_rest() {
        let transport = ScriptedTransport::new(vec![lines(&[
            "257000001,10.5,0",
            "static",
            "not a frame",
            "",
            "257000002,3.0,1",
        ])]);
        let h = spawn(tokens(1), transport, 0);

        let first = h.rx.recv().await.unwrap();
        let second = h.rx.recv().await.unwrap();
        assert_eq!(first.message.mmsi().value(), 257_000_001);
        assert_eq!(second.message.mmsi().value(), 257_000_002);

        h.cancel.cancel();
        h.handle.await.unwrap().unwrap();

        let status = h.state.status();
        assert_eq!(status.messages_received, 2);
        assert_eq!(status.decode_failures, 1);
        assert_eq!(status.frames_skipped, 1);
        assert_eq!(status.state, ConnectionState::Disconnected);
        // sender dropped on shutdown
        assert!(h.rx.recv().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_remote_close() {
        let transport = ScriptedTransport::new(vec![
            lines(&["257000001,10.0,0", "257000002,11.0,0"]),
            Err(ConnectionError::Connect("refused".into())),
            lines(&["257000003,12.0,1"]),
        ]);
        let h = spawn(tokens(1), Arc::clone(&transport), 0);

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(h.rx.recv().await.unwrap().message.mmsi().value());
        }
        assert_eq!(received, vec![257_000_001, 257_000_002, 257_000_003]);

        // third session ends too; the idle fourth keeps the ingestor streaming
        while transport.opens.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        h.cancel.cancel();
        h.handle.await.unwrap().unwrap();
        assert_eq!(h.state.messages_received(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_triggers_reconnect() {
        let transport = ScriptedTransport::new(vec![]);
        let h = spawn(tokens(1), Arc::clone(&transport), 2);

        // idle sessions time out after 5s each; budget of 2 reconnects
        let result = h.handle.await.unwrap();
        match result {
            Err(IngestError::ReconnectExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, ConnectionError::ReadTimeout(Duration::from_secs(5)));
            }
            other => panic!("expected ReconnectExhausted, got {other:?}"),
        }
        assert_eq!(transport.opens.load(Ordering::SeqCst), 3);
        assert_eq!(h.state.state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_refreshes_token() {
        let transport = ScriptedTransport::new(vec![
            Err(ConnectionError::Unauthorized { status: 401 }),
            lines(&["257000001,10.0,0"]),
        ]);
        let h = spawn(tokens(2), transport, 0);

        assert_eq!(h.rx.recv().await.unwrap().message.mmsi().value(), 257_000_001);
        h.cancel.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_auth_error_stops_ingestor() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch_token()
            .times(1)
            .returning(|| Err(AuthError::InvalidCredentials("401".into())));
        let transport = ScriptedTransport::new(vec![]);
        let h = spawn(source, Arc::clone(&transport), 0);

        let result = h.handle.await.unwrap();
        assert!(matches!(
            result,
            Err(IngestError::Auth(AuthError::InvalidCredentials(_)))
        ));
        assert_eq!(transport.opens.load(Ordering::SeqCst), 0);
        assert_eq!(h.state.state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_blocked_on_full_queue() {
        let frames: Vec<String> = (0..10).map(|i| format!("25700000{i},1.0,{i}")).collect();
        let refs: Vec<&str> = frames.iter().map(String::as_str).collect();
        let transport = ScriptedTransport::new(vec![lines(&refs)]);

        let (tx, rx) = queue::bounded(2, BackpressurePolicy::Block);
        let state = Arc::new(FeedState::new());
        let cancel = CancellationToken::new();
        let ingestor = StreamIngestor::new(
            AuthClient::new(Arc::new(tokens(1)), AuthConfig::default()),
            transport,
            Arc::new(CsvDecoder),
            tx,
            Arc::clone(&state),
            config(0),
            cancel.clone(),
        );
        let handle = tokio::spawn(ingestor.run());

        while rx.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(rx.len(), 2);
    }
}
