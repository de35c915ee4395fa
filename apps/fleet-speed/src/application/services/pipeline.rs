//! Pipeline
//!
//! Wires the ingestor, aggregator and reporter together and maps their
//! outcomes to a single result.
//!
//! ```text
//! TokenSource ─► StreamIngestor ─► [bounded queue] ─► Aggregator ◄─ Reporter ─► SnapshotSink
//!                                                    (window, ranking)  (1 Hz)
//! ```
//!
//! Shutdown order: the ingestor stops and drops the queue sender, the
//! aggregator drains what is left, the reporter flushes one last snapshot
//! and drops the request channel, which lets the aggregator finish. A task
//! that ends on its own (error or panic) triggers the same shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedTransport, FrameDecoder, SnapshotSink, TokenSource};
use crate::application::services::aggregator::{Aggregator, AggregatorConfig};
use crate::application::services::auth_client::{AuthClient, AuthConfig};
use crate::application::services::feed_state::FeedState;
use crate::application::services::ingestor::{IngestError, IngestorConfig, StreamIngestor};
use crate::application::services::queue::{self, BackpressurePolicy};
use crate::application::services::reporter::{REPORT_INTERVAL, Reporter};
use crate::domain::ranking::{RankingConfig, RankingConfigError, RankingEngine};
use crate::domain::window::{DEFAULT_WINDOW, WindowCounter};

/// Snapshot request channel depth; the reporter has at most one in flight.
const REQUEST_CHANNEL_CAPACITY: usize = 4;

/// Everything needed to assemble the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Trailing window length.
    pub window: Duration,
    /// Ranking staleness settings.
    pub ranking: RankingConfig,
    /// Ranking length and compaction period.
    pub aggregator: AggregatorConfig,
    /// Message queue capacity.
    pub queue_capacity: usize,
    /// Behavior when the queue is full.
    pub backpressure: BackpressurePolicy,
    /// Connection timeouts and reconnect schedule.
    pub ingestor: IngestorConfig,
    /// Token refresh settings.
    pub auth: AuthConfig,
    /// Snapshot period.
    pub report_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            ranking: RankingConfig::default(),
            aggregator: AggregatorConfig::default(),
            queue_capacity: 4096,
            backpressure: BackpressurePolicy::Block,
            ingestor: IngestorConfig::default(),
            auth: AuthConfig::default(),
            report_interval: REPORT_INTERVAL,
        }
    }
}

/// Provider-specific adapters.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Access token source.
    pub token_source: Arc<dyn TokenSource>,
    /// Feed session opener.
    pub transport: Arc<dyn FeedTransport>,
    /// Frame decoder.
    pub decoder: Arc<dyn FrameDecoder>,
    /// Snapshot output.
    pub sink: Arc<dyn SnapshotSink>,
}

/// Pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Ingestor stopped on a fatal error.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// A task panicked or was aborted.
    #[error("pipeline task failed: {0}")]
    Task(#[from] JoinError),

    /// Ranking settings are inconsistent.
    #[error("invalid ranking configuration: {0}")]
    Ranking(#[from] RankingConfigError),
}

/// Totals reported on clean shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Snapshots handed to the sink.
    pub snapshots_emitted: u64,
    /// Position messages decoded.
    pub messages_received: u64,
}

/// Assembled pipeline, ready to run.
pub struct Pipeline {
    config: PipelineConfig,
    ports: PipelinePorts,
    state: Arc<FeedState>,
}

impl Pipeline {
    /// Create a pipeline publishing feed status into `state`.
    #[must_use]
    pub const fn new(config: PipelineConfig, ports: PipelinePorts, state: Arc<FeedState>) -> Self {
        Self {
            config,
            ports,
            state,
        }
    }

    /// Run until `cancel` fires or any of the three tasks ends.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` on invalid ranking settings, a fatal ingest
    /// error, or a task panic.
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineSummary, PipelineError> {
        let Self {
            config,
            ports,
            state,
        } = self;

        let ranking = RankingEngine::new(config.ranking)?;
        let aggregator = Aggregator::new(
            WindowCounter::new(config.window),
            ranking,
            config.aggregator,
        );

        let stop = cancel.child_token();
        let (queue_tx, queue_rx) = queue::bounded(config.queue_capacity.max(1), config.backpressure);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        let ingestor = StreamIngestor::new(
            AuthClient::new(ports.token_source, config.auth),
            ports.transport,
            ports.decoder,
            queue_tx,
            Arc::clone(&state),
            config.ingestor,
            stop.clone(),
        );
        let reporter = Reporter::new(request_tx, ports.sink).with_period(config.report_interval);

        let mut aggregator_task = tokio::spawn(aggregator.run(queue_rx, request_rx, stop.clone()));
        let mut reporter_task = tokio::spawn(reporter.run(stop.clone()));
        let mut ingestor_task = tokio::spawn(ingestor.run());

        tracing::info!(
            queue_capacity = config.queue_capacity,
            backpressure = %config.backpressure,
            top_k = config.aggregator.top_k,
            "Pipeline started"
        );

        // Whichever task ends first takes the others down with it.
        let mut ingest_result = None;
        let mut reporter_result = None;
        let mut aggregator_result = None;
        tokio::select! {
            result = &mut ingestor_task => ingest_result = Some(result),
            result = &mut reporter_task => {
                if !stop.is_cancelled() {
                    tracing::error!("Reporter stopped unexpectedly, shutting down pipeline");
                }
                reporter_result = Some(result);
            }
            result = &mut aggregator_task => {
                if !stop.is_cancelled() {
                    tracing::error!("Aggregator stopped unexpectedly, shutting down pipeline");
                }
                aggregator_result = Some(result);
            }
        }
        stop.cancel();

        let ingest_result = match ingest_result {
            Some(result) => result,
            None => ingestor_task.await,
        };
        let reporter_result = match reporter_result {
            Some(result) => result,
            None => reporter_task.await,
        };
        let aggregator_result = match aggregator_result {
            Some(result) => result,
            None => aggregator_task.await,
        };

        let snapshots_emitted = reporter_result?;
        aggregator_result?;
        ingest_result??;

        let summary = PipelineSummary {
            snapshots_emitted,
            messages_received: state.messages_received(),
        };
        tracing::info!(
            snapshots = summary.snapshots_emitted,
            messages = summary.messages_received,
            "Pipeline stopped"
        );
        Ok(summary)
    }
}
