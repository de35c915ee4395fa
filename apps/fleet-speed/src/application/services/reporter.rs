//! Reporter
//!
//! Asks the aggregator for a snapshot once per second and hands it to the
//! sink. Ticks are scheduled against absolute time, so slow sinks do not
//! shift later ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::SnapshotSink;
use crate::application::services::aggregator::{SnapshotRequest, request_snapshot};
use crate::infrastructure::metrics;

/// Default reporting period.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic snapshot publisher.
pub struct Reporter {
    requests: mpsc::Sender<SnapshotRequest>,
    sink: Arc<dyn SnapshotSink>,
    period: Duration,
}

impl Reporter {
    /// Create a reporter with the default one-second period.
    #[must_use]
    pub fn new(requests: mpsc::Sender<SnapshotRequest>, sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            requests,
            sink,
            period: REPORT_INTERVAL,
        }
    }

    /// Override the reporting period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run until shutdown, then flush one final snapshot.
    ///
    /// Returns the number of snapshots emitted.
    #[tracing::instrument(name = "reporter", skip_all)]
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut emitted = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.report().await {
                        tracing::warn!("Aggregator unavailable, stopping reporter");
                        return emitted;
                    }
                    emitted += 1;
                }
            }
        }

        if self.report().await {
            emitted += 1;
            tracing::info!(emitted, "Final snapshot flushed");
        }
        emitted
    }

    /// Emit one snapshot. Returns `false` if the aggregator is gone.
    async fn report(&self) -> bool {
        let Some(snapshot) = request_snapshot(&self.requests).await else {
            return false;
        };
        if let Err(e) = self.sink.emit(&snapshot).await {
            metrics::record_sink_error();
            tracing::warn!(error = %e, "Failed to emit snapshot");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use crate::application::ports::SinkError;
    use crate::domain::snapshot::TrafficSnapshot;

    #[derive(Default)]
    struct RecordingSink {
        emitted: Mutex<Vec<(Instant, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl SnapshotSink for RecordingSink {
        async fn emit(&self, snapshot: &TrafficSnapshot) -> Result<(), SinkError> {
            self.emitted.lock().push((Instant::now(), snapshot.window_count));
            if self.fail {
                return Err(SinkError::Closed);
            }
            Ok(())
        }
    }

    /// Answers every request with a counter value as the window count.
    fn fake_aggregator() -> mpsc::Sender<SnapshotRequest> {
        let (tx, mut rx) = mpsc::channel::<SnapshotRequest>(4);
        tokio::spawn(async move {
            let mut n = 0;
            while let Some(request) = rx.recv().await {
                n += 1;
                let _ = request.reply.send(TrafficSnapshot {
                    generated_at: Utc::now(),
                    window_count: n,
                    ranking: Vec::new(),
                });
            }
        });
        tx
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_second_and_flushes_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let reporter = Reporter::new(fake_aggregator(), Arc::clone(&sink) as Arc<dyn SnapshotSink>);
        let task = tokio::spawn(reporter.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), 4);

        let emitted = sink.emitted.lock().clone();
        let offsets: Vec<u128> = emitted
            .iter()
            .map(|(at, _)| (*at - start).as_millis())
            .collect();
        assert_eq!(offsets, vec![1000, 2000, 3000, 3500]);
        assert_eq!(emitted.last().map(|(_, n)| *n), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn sink_errors_do_not_stop_the_loop() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let cancel = CancellationToken::new();
        let reporter = Reporter::new(fake_aggregator(), Arc::clone(&sink) as Arc<dyn SnapshotSink>);
        let task = tokio::spawn(reporter.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(sink.emitted.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_aggregator_is_gone() {
        let (tx, rx) = mpsc::channel::<SnapshotRequest>(1);
        drop(rx);
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(tx, Arc::clone(&sink) as Arc<dyn SnapshotSink>);

        assert_eq!(reporter.run(CancellationToken::new()).await, 0);
        assert!(sink.emitted.lock().is_empty());
    }
}
