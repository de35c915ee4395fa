//! Bounded Message Queue
//!
//! Single hand-off point between the ingestor and the aggregator. The
//! ingestor owns the only sender, so dropping it closes the queue.

use std::fmt;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics;

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Wait for capacity, slowing the reader.
    #[default]
    Block,
    /// Evict the oldest queued message to make room.
    DropOldest,
}

impl BackpressurePolicy {
    /// Configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::DropOldest => "drop-oldest",
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "drop-oldest" | "drop_oldest" | "dropoldest" => Ok(Self::DropOldest),
            other => Err(format!("unknown backpressure policy '{other}'")),
        }
    }
}

/// Result of a queue send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Enqueued.
    Sent,
    /// Enqueued after evicting the oldest message.
    Displaced,
    /// Shutdown was requested while waiting for capacity.
    Cancelled,
    /// The receiver is gone.
    Closed,
}

/// Sending half, owned by the ingestor.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: async_channel::Sender<T>,
    policy: BackpressurePolicy,
}

/// Receiving half, owned by the aggregator.
pub type QueueReceiver<T> = async_channel::Receiver<T>;

/// Create a bounded queue.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn bounded<T>(capacity: usize, policy: BackpressurePolicy) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = async_channel::bounded(capacity);
    (QueueSender { tx, policy }, rx)
}

impl<T> QueueSender<T> {
    /// Enqueue `item` according to the backpressure policy.
    pub async fn send(&self, item: T, cancel: &CancellationToken) -> SendOutcome {
        match self.policy {
            BackpressurePolicy::Block => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => SendOutcome::Cancelled,
                    result = self.tx.send(item) => match result {
                        Ok(()) => SendOutcome::Sent,
                        Err(_) => SendOutcome::Closed,
                    },
                }
            }
            BackpressurePolicy::DropOldest => match self.tx.force_send(item) {
                Ok(None) => SendOutcome::Sent,
                Ok(Some(_evicted)) => {
                    metrics::record_message_dropped();
                    SendOutcome::Displaced
                }
                Err(_) => SendOutcome::Closed,
            },
        }
    }

    /// Messages currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Configured policy.
    #[must_use]
    pub const fn policy(&self) -> BackpressurePolicy {
        self.policy
    }
}
