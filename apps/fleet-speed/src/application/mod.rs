//! Application Layer - Pipeline services and port definitions.
//!
//! Services here drive the domain types and talk to the outside world only
//! through the traits in `ports`.

/// Port interfaces for the feed provider and the output boundary.
pub mod ports;

/// Ingestion, aggregation and reporting services.
pub mod services;
