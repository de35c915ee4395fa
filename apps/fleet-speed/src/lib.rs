#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Fleet Speed - Live AIS Traffic Monitor
//!
//! Consumes the BarentsWatch live AIS stream and publishes, once per
//! second, how many position reports arrived in the trailing window and
//! which vessels are currently fastest.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and algorithms with no I/O
//!   - `vessel`: MMSI and validated position reports
//!   - `window`: Trailing-window arrival counter
//!   - `ranking`: Per-vessel latest reading and top-k by speed
//!   - `snapshot`: Once-per-second output view
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Token source, feed transport, frame decoder, snapshot sink
//!   - `services`: Auth client, ingestor, aggregator, reporter, pipeline
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `barentswatch`: OAuth token source, HTTP stream transport, JSON decoder
//!   - `sink`: Log, JSON lines and channel sinks
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! BarentsWatch ──► StreamIngestor ──► [bounded queue] ──► Aggregator ◄── Reporter ──► Sink
//!   (HTTP)        (auth, decode,                         (window,        (1 Hz)
//!                  reconnect)                             ranking)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::ranking::{Observation, RankedVessel, RankingConfig, RankingEngine};
pub use domain::snapshot::TrafficSnapshot;
pub use domain::vessel::{AisMessage, Mmsi};
pub use domain::window::WindowCounter;

// Pipeline
pub use application::services::feed_state::{ConnectionState, FeedState, FeedStatus};
pub use application::services::pipeline::{
    Pipeline, PipelineConfig, PipelineError, PipelinePorts, PipelineSummary,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FleetSpeedConfig, OutputFormat};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
