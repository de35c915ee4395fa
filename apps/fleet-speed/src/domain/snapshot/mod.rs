//! Traffic Snapshot
//!
//! Immutable once-per-second view handed to the output boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ranking::RankedVessel;

/// Point-in-time traffic view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSnapshot {
    /// Wall-clock time the snapshot was built.
    pub generated_at: DateTime<Utc>,
    /// Messages received in the trailing window.
    pub window_count: usize,
    /// Fastest vessels, best first.
    pub ranking: Vec<RankedVessel>,
}

impl TrafficSnapshot {
    /// Fastest vessel, if any.
    #[must_use]
    pub fn leader(&self) -> Option<&RankedVessel> {
        self.ranking.first()
    }
}
