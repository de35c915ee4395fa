//! Port Interfaces
//!
//! Contracts between the pipeline services and the provider-specific
//! adapters in the infrastructure layer.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TokenSource`: exchanges credentials for an access token
//! - `FeedTransport`: opens a streaming session to the AIS feed
//! - `FrameDecoder`: turns one wire frame into a typed `Frame`
//! - `SnapshotSink`: receives the once-per-second snapshot

mod feed_transport;
mod frame_decoder;
mod snapshot_sink;
mod token_source;

pub use feed_transport::{ConnectionError, FeedTransport, FrameStream};
pub use frame_decoder::{DecodeError, Frame, FrameDecoder};
pub use snapshot_sink::{SinkError, SnapshotSink};
pub use token_source::{
    AccessToken, AuthError, DEFAULT_TOKEN_LIFETIME, MAX_TOKEN_LIFETIME, TokenSource,
};

#[cfg(test)]
pub use token_source::MockTokenSource;
