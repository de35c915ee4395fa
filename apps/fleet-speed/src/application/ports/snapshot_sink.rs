//! Snapshot Sink Port (Driven Port)
//!
//! Output boundary for the once-per-second traffic snapshot.

use async_trait::async_trait;

use crate::domain::snapshot::TrafficSnapshot;

/// Errors from emitting a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing to the output failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be serialized.
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The receiving side has gone away.
    #[error("sink closed")]
    Closed,
}

/// Port for publishing snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Publish one snapshot.
    async fn emit(&self, snapshot: &TrafficSnapshot) -> Result<(), SinkError>;
}
