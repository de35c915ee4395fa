//! Vessel Speed Ranking
//!
//! Tracks the latest accepted speed reading for every vessel and serves a
//! top-K view on demand.
//!
//! # Acceptance rule
//!
//! A reading for a known vessel is accepted when its timestamp is not older
//! than the newest timestamp seen for that vessel by more than the staleness
//! tolerance. A reading with the same timestamp as the stored one is a
//! redelivery and leaves the state untouched.
//!
//! # Ordering
//!
//! Speed descending, then timestamp descending, then MMSI ascending.
//!
//! # Memory
//!
//! `compact` drops vessels not heard from within the staleness threshold,
//! which bounds the map under vessel churn.

use std::cmp::{Ordering, Reverse};
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::domain::vessel::{AisMessage, Mmsi};

// =============================================================================
// Configuration
// =============================================================================

/// Ranking engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingConfig {
    /// How much older than the newest known reading a reading may be and
    /// still be accepted.
    pub staleness_tolerance: Duration,
    /// Vessels last seen longer ago than this are left out of the ranking.
    pub ranking_window: Duration,
    /// Vessels last seen longer ago than this are removed by compaction.
    pub staleness_threshold: Duration,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            staleness_tolerance: Duration::from_secs(5),
            ranking_window: Duration::from_secs(120),
            staleness_threshold: Duration::from_secs(600),
        }
    }
}

/// Invalid ranking configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankingConfigError {
    /// Compaction would remove vessels that are still rankable.
    #[error("staleness threshold ({threshold:?}) must exceed ranking window ({window:?})")]
    ThresholdNotAboveWindow {
        /// Configured staleness threshold.
        threshold: Duration,
        /// Configured ranking window.
        window: Duration,
    },

    /// A duration does not fit the timestamp arithmetic range.
    #[error("duration out of range: {0:?}")]
    OutOfRange(Duration),
}

fn to_delta(d: Duration) -> Result<TimeDelta, RankingConfigError> {
    TimeDelta::from_std(d).map_err(|_| RankingConfigError::OutOfRange(d))
}

// =============================================================================
// Vessel State
// =============================================================================

/// Latest accepted reading for one vessel.
#[derive(Debug, Clone, PartialEq)]
pub struct VesselState {
    latest: AisMessage,
    last_seen: DateTime<Utc>,
}

impl VesselState {
    fn new(message: AisMessage) -> Self {
        let last_seen = message.timestamp();
        Self {
            latest: message,
            last_seen,
        }
    }

    /// Latest accepted message.
    #[must_use]
    pub const fn latest(&self) -> &AisMessage {
        &self.latest
    }

    /// Newest message timestamp ever accepted for this vessel.
    #[must_use]
    pub const fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }
}

/// Outcome of offering a message to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting of the vessel.
    Inserted,
    /// Stored reading replaced.
    Updated,
    /// Same timestamp as the stored reading; ignored.
    Duplicate,
    /// Older than the staleness tolerance allows; ignored.
    Stale,
}

// =============================================================================
// Ranked Vessel
// =============================================================================

/// One row of the speed ranking.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RankedVessel {
    /// Vessel identifier.
    pub mmsi: Mmsi,
    /// Speed over ground in knots.
    pub speed: f64,
    /// Timestamp of the reading.
    pub timestamp: DateTime<Utc>,
}

impl RankedVessel {
    fn from_state(state: &VesselState) -> Self {
        Self {
            mmsi: state.latest.mmsi(),
            speed: state.latest.speed_over_ground(),
            timestamp: state.latest.timestamp(),
        }
    }
}

impl Ord for RankedVessel {
    /// Greater means ranked higher.
    fn cmp(&self, other: &Self) -> Ordering {
        self.speed
            .total_cmp(&other.speed)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| other.mmsi.cmp(&self.mmsi))
    }
}

impl PartialOrd for RankedVessel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankedVessel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedVessel {}

// =============================================================================
// Ranking Engine
// =============================================================================

/// Per-vessel speed tracker with on-demand top-K.
#[derive(Debug)]
pub struct RankingEngine {
    vessels: HashMap<Mmsi, VesselState>,
    staleness_tolerance: TimeDelta,
    ranking_window: TimeDelta,
    staleness_threshold: TimeDelta,
}

impl RankingEngine {
    /// Create an engine.
    ///
    /// # Errors
    ///
    /// Returns `RankingConfigError` if the staleness threshold does not
    /// exceed the ranking window or a duration is out of range.
    pub fn new(config: RankingConfig) -> Result<Self, RankingConfigError> {
        if config.staleness_threshold <= config.ranking_window {
            return Err(RankingConfigError::ThresholdNotAboveWindow {
                threshold: config.staleness_threshold,
                window: config.ranking_window,
            });
        }

        Ok(Self {
            vessels: HashMap::new(),
            staleness_tolerance: to_delta(config.staleness_tolerance)?,
            ranking_window: to_delta(config.ranking_window)?,
            staleness_threshold: to_delta(config.staleness_threshold)?,
        })
    }

    /// Offer a message.
    pub fn observe(&mut self, message: AisMessage) -> Observation {
        match self.vessels.entry(message.mmsi()) {
            Entry::Vacant(slot) => {
                slot.insert(VesselState::new(message));
                Observation::Inserted
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                let t = message.timestamp();

                if t == state.latest.timestamp() {
                    return Observation::Duplicate;
                }
                let floor = state.last_seen.checked_sub_signed(self.staleness_tolerance);
                if floor.is_some_and(|floor| t < floor) {
                    return Observation::Stale;
                }

                state.last_seen = state.last_seen.max(t);
                state.latest = message;
                Observation::Updated
            }
        }
    }

    /// The `k` fastest vessels seen within the ranking window of `now`.
    #[must_use]
    pub fn top_k(&self, now: DateTime<Utc>, k: usize) -> Vec<RankedVessel> {
        if k == 0 {
            return Vec::new();
        }

        let mut heap: BinaryHeap<Reverse<RankedVessel>> = BinaryHeap::with_capacity(k + 1);
        for state in self.vessels.values() {
            if now - state.last_seen > self.ranking_window {
                continue;
            }
            heap.push(Reverse(RankedVessel::from_state(state)));
            if heap.len() > k {
                heap.pop();
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|Reverse(v)| v)
            .collect()
    }

    /// Remove vessels not seen within the staleness threshold of `now`.
    ///
    /// Returns the number of vessels removed.
    pub fn compact(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.vessels.len();
        let threshold = self.staleness_threshold;
        self.vessels
            .retain(|_, state| now - state.last_seen <= threshold);
        before - self.vessels.len()
    }

    /// Stored state for a vessel.
    #[must_use]
    pub fn get(&self, mmsi: Mmsi) -> Option<&VesselState> {
        self.vessels.get(&mmsi)
    }

    /// Number of tracked vessels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vessels.len()
    }

    /// Whether no vessels are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vessels.is_empty()
    }
}
