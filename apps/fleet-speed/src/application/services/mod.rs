//! Application Services
//!
//! The long-running pipeline tasks and the pieces they share.
//!
//! - `StreamIngestor`: feed session lifecycle and decoding
//! - `Aggregator`: window counting and speed ranking
//! - `Reporter`: once-per-second snapshot publication
//! - `Pipeline`: task wiring and shutdown

/// Access token cache with retrying refresh.
pub mod auth_client;

/// Exponential backoff with jitter.
pub mod backoff;

/// Connection status shared with the health endpoint.
pub mod feed_state;

/// Bounded hand-off queue with backpressure policies.
pub mod queue;

/// Feed reader task.
pub mod ingestor;

/// Aggregation task.
pub mod aggregator;

/// Snapshot publishing task.
pub mod reporter;

/// Task wiring.
pub mod pipeline;
