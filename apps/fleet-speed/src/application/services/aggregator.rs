//! Aggregator
//!
//! Single task that owns the window counter and the ranking engine. It
//! drains the message queue, compacts the ranking on a timer and answers
//! snapshot requests. Nothing else touches either structure, so no locks
//! are involved.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::services::queue::QueueReceiver;
use crate::domain::ranking::{Observation, RankingEngine};
use crate::domain::snapshot::TrafficSnapshot;
use crate::domain::vessel::AisMessage;
use crate::domain::window::WindowCounter;
use crate::infrastructure::metrics;

/// A position report stamped when the ingestor read it off the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    /// The report.
    pub message: AisMessage,
    /// Receipt instant, counted by the trailing window.
    pub received_at: Instant,
}

impl Received {
    /// Stamp `message` with the current receipt time.
    #[must_use]
    pub fn now(message: AisMessage) -> Self {
        Self {
            message,
            received_at: now(),
        }
    }
}

/// Request for a snapshot, answered over `reply`.
#[derive(Debug)]
pub struct SnapshotRequest {
    /// Where to send the snapshot.
    pub reply: oneshot::Sender<TrafficSnapshot>,
}

/// Aggregation settings.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Ranking length.
    pub top_k: usize,
    /// Interval between compaction passes.
    pub compaction_interval: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            compaction_interval: Duration::from_secs(30),
        }
    }
}

/// Aggregation task state.
#[derive(Debug)]
pub struct Aggregator {
    window: WindowCounter,
    ranking: RankingEngine,
    config: AggregatorConfig,
}

impl Aggregator {
    /// Create an aggregator around empty domain structures.
    #[must_use]
    pub const fn new(window: WindowCounter, ranking: RankingEngine, config: AggregatorConfig) -> Self {
        Self {
            window,
            ranking,
            config,
        }
    }

    /// Account for one received message.
    pub fn ingest(&mut self, message: AisMessage, received_at: Instant) -> Observation {
        self.window.record(received_at);
        let observation = self.ranking.observe(message);
        metrics::record_observation(observation);
        observation
    }

    /// Build a snapshot: window count at `now`, ranking at the wall clock.
    pub fn snapshot(&mut self, now: Instant) -> TrafficSnapshot {
        let started = Instant::now();
        let generated_at = Utc::now();
        let window_count = self.window.count(now);
        let ranking = self.ranking.top_k(generated_at, self.config.top_k);

        metrics::set_window_count(window_count);
        metrics::set_vessels_tracked(self.ranking.len());
        metrics::record_snapshot_build(started.elapsed());

        TrafficSnapshot {
            generated_at,
            window_count,
            ranking,
        }
    }

    /// Remove stale vessels.
    pub fn compact(&mut self) -> usize {
        let removed = self.ranking.compact(Utc::now());
        metrics::record_vessels_compacted(removed);
        metrics::set_vessels_tracked(self.ranking.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.ranking.len(), "Compacted vessel state");
        }
        removed
    }

    /// Tracked vessel count.
    #[must_use]
    pub fn vessels(&self) -> usize {
        self.ranking.len()
    }

    /// Run until shutdown.
    ///
    /// On shutdown, messages already queued are drained, then snapshot
    /// requests are answered until every requester has gone away.
    #[tracing::instrument(name = "aggregator", skip_all)]
    pub async fn run(
        mut self,
        messages: QueueReceiver<Received>,
        mut requests: mpsc::Receiver<SnapshotRequest>,
        cancel: CancellationToken,
    ) {
        let period = self.config.compaction_interval.max(Duration::from_millis(1));
        let mut compaction = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        compaction.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut queue_open = true;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => self.reply(request),
                    None => {
                        tracing::debug!("Snapshot requesters gone");
                        break;
                    }
                },
                message = messages.recv(), if queue_open => match message {
                    Ok(received) => {
                        self.ingest(received.message, received.received_at);
                    }
                    Err(_) => {
                        tracing::info!("Message queue closed");
                        queue_open = false;
                    }
                },
                _ = compaction.tick() => {
                    self.compact();
                }
            }
        }

        let mut drained = 0usize;
        while let Ok(received) = messages.try_recv() {
            self.ingest(received.message, received.received_at);
            drained += 1;
        }
        tracing::info!(drained, vessels = self.ranking.len(), "Aggregator draining");

        while let Some(request) = requests.recv().await {
            self.reply(request);
        }
        tracing::info!("Aggregator stopped");
    }

    fn reply(&mut self, request: SnapshotRequest) {
        let snapshot = self.snapshot(now());
        if request.reply.send(snapshot).is_err() {
            tracing::debug!("Snapshot requester went away");
        }
    }
}

/// Receipt clock, follows tokio's (pausable) time.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Ask the aggregator for a snapshot.
///
/// Returns `None` if the aggregator has stopped.
pub async fn request_snapshot(requests: &mpsc::Sender<SnapshotRequest>) -> Option<TrafficSnapshot> {
    let (reply, rx) = oneshot::channel();
    requests.send(SnapshotRequest { reply }).await.ok()?;
    rx.await.ok()
}
