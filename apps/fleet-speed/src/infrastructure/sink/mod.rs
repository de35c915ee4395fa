//! Snapshot Sinks
//!
//! Output adapters for the once-per-second traffic snapshot:
//!
//! - `TracingSink`: one structured log event per snapshot
//! - `JsonLinesSink`: newline-delimited JSON on any async writer (stdout by default)
//! - `ChannelSink`: forwards snapshots over an mpsc channel, for embedding and tests

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::{Mutex, mpsc};

use crate::application::ports::{SinkError, SnapshotSink};
use crate::domain::snapshot::TrafficSnapshot;

// =============================================================================
// Tracing
// =============================================================================

/// Emits each snapshot as an `info` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl SnapshotSink for TracingSink {
    async fn emit(&self, snapshot: &TrafficSnapshot) -> Result<(), SinkError> {
        let ranking = serde_json::to_string(&snapshot.ranking)?;
        match snapshot.leader() {
            Some(leader) => tracing::info!(
                window_count = snapshot.window_count,
                leader_mmsi = %leader.mmsi,
                leader_speed = leader.speed,
                ranking = %ranking,
                "Traffic snapshot"
            ),
            None => tracing::info!(
                window_count = snapshot.window_count,
                "Traffic snapshot (no vessels ranked)"
            ),
        }
        Ok(())
    }
}

// =============================================================================
// JSON Lines
// =============================================================================

/// Writes each snapshot as one JSON line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl JsonLinesSink<Stdout> {
    /// Sink writing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> JsonLinesSink<W> {
    /// Sink writing to `writer`.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> SnapshotSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, snapshot: &TrafficSnapshot) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(snapshot)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Forwards snapshots to an mpsc receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TrafficSnapshot>,
}

impl ChannelSink {
    /// Create a sink and its receiving end.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TrafficSnapshot>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SnapshotSink for ChannelSink {
    async fn emit(&self, snapshot: &TrafficSnapshot) -> Result<(), SinkError> {
        self.tx
            .send(snapshot.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }
}
