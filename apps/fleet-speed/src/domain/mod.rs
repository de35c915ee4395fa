//! Domain Layer - Vessel data and aggregation logic.
//!
//! Pure, synchronous types: message validation, the trailing window
//! counter and the speed ranking. Nothing here performs I/O.

/// Validated AIS position reports and vessel identifiers.
pub mod vessel;

/// Trailing-window arrival counter.
pub mod window;

/// Per-vessel speed ranking with staleness handling.
pub mod ranking;

/// Snapshot value emitted once per second.
pub mod snapshot;
