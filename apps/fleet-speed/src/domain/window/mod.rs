//! Trailing Window Counter
//!
//! Counts message arrivals inside a trailing window `(now - W, now]`.
//!
//! Arrivals are keyed by *receipt* instant, not by the message's own
//! timestamp, so the count measures ingestion throughput. Receipt instants
//! are appended in arrival order, which keeps the queue sorted and makes
//! eviction a pop from the front.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default trailing window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Sliding-window arrival counter.
#[derive(Debug, Clone)]
pub struct WindowCounter {
    window: Duration,
    arrivals: VecDeque<Instant>,
}

impl Default for WindowCounter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl WindowCounter {
    /// Create a counter with the given window length.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            arrivals: VecDeque::new(),
        }
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Record an arrival.
    ///
    /// An instant earlier than the newest recorded arrival is clamped to it,
    /// keeping the queue ordered.
    pub fn record(&mut self, received_at: Instant) {
        let at = self
            .arrivals
            .back()
            .map_or(received_at, |last| received_at.max(*last));
        self.arrivals.push_back(at);
        self.evict(at);
    }

    /// Number of arrivals in `(now - window, now]`.
    ///
    /// Repeated calls with the same `now` return the same value.
    pub fn count(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.arrivals.partition_point(|t| *t <= now)
    }

    /// Number of retained arrival instants, including any not yet evicted.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.arrivals.len()
    }

    fn evict(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self.arrivals.front().is_some_and(|t| *t <= cutoff) {
            self.arrivals.pop_front();
        }
    }
}
