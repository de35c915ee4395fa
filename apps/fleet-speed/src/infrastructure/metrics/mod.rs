//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ingest**: Frames received, decode failures, dropped messages
//! - **Connection**: Reconnects and token refreshes
//! - **Aggregation**: Window count, tracked vessels, compaction
//! - **Output**: Snapshot build latency and sink failures
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use parking_lot::{Mutex, const_mutex};

use crate::domain::ranking::Observation;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INIT_LOCK: Mutex<()> = const_mutex(());

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns `BuildError` if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let _init = INIT_LOCK.lock();
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Ingest
    describe_counter!(
        "fleet_speed_frames_received_total",
        "Frames received from the AIS feed by kind"
    );
    describe_counter!(
        "fleet_speed_decode_failures_total",
        "Frames that failed to decode by reason"
    );
    describe_counter!(
        "fleet_speed_oversized_frames_total",
        "Frames skipped for exceeding the maximum frame length"
    );
    describe_counter!(
        "fleet_speed_messages_dropped_total",
        "Queued messages evicted by the drop-oldest policy"
    );

    // Connection
    describe_counter!(
        "fleet_speed_reconnects_total",
        "Feed reconnection attempts by cause"
    );
    describe_counter!(
        "fleet_speed_auth_refreshes_total",
        "Access token refreshes by outcome"
    );

    // Aggregation
    describe_counter!(
        "fleet_speed_observations_total",
        "Ranking observations by outcome"
    );
    describe_gauge!(
        "fleet_speed_window_count",
        "Messages received in the trailing window"
    );
    describe_gauge!(
        "fleet_speed_vessels_tracked",
        "Vessels currently held by the ranking engine"
    );
    describe_counter!(
        "fleet_speed_vessels_compacted_total",
        "Vessels removed by compaction"
    );

    // Output
    describe_histogram!(
        "fleet_speed_snapshot_build_seconds",
        "Time to build a traffic snapshot"
    );
    describe_counter!(
        "fleet_speed_sink_errors_total",
        "Snapshots the sink failed to emit"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded frame by kind.
pub fn record_frame(kind: &'static str) {
    counter!("fleet_speed_frames_received_total", "kind" => kind).increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_failure(reason: &'static str) {
    counter!("fleet_speed_decode_failures_total", "reason" => reason).increment(1);
}

/// Record a frame skipped for length.
pub fn record_oversized_frame() {
    counter!("fleet_speed_oversized_frames_total").increment(1);
}

/// Record a message evicted from the queue.
pub fn record_message_dropped() {
    counter!("fleet_speed_messages_dropped_total").increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(cause: &'static str) {
    counter!("fleet_speed_reconnects_total", "cause" => cause).increment(1);
}

/// Record a token refresh.
pub fn record_auth_refresh(outcome: &'static str) {
    counter!("fleet_speed_auth_refreshes_total", "outcome" => outcome).increment(1);
}

/// Record the outcome of offering a message to the ranking engine.
pub fn record_observation(observation: Observation) {
    let outcome = match observation {
        Observation::Inserted => "inserted",
        Observation::Updated => "updated",
        Observation::Duplicate => "duplicate",
        Observation::Stale => "stale",
    };
    counter!("fleet_speed_observations_total", "outcome" => outcome).increment(1);
}

/// Update the trailing window count.
#[allow(clippy::cast_precision_loss)]
pub fn set_window_count(count: usize) {
    gauge!("fleet_speed_window_count").set(count as f64);
}

/// Update the tracked vessel count.
#[allow(clippy::cast_precision_loss)]
pub fn set_vessels_tracked(count: usize) {
    gauge!("fleet_speed_vessels_tracked").set(count as f64);
}

/// Record vessels removed by a compaction pass.
pub fn record_vessels_compacted(count: usize) {
    counter!("fleet_speed_vessels_compacted_total").increment(count as u64);
}

/// Record snapshot build duration.
pub fn record_snapshot_build(duration: Duration) {
    histogram!("fleet_speed_snapshot_build_seconds").record(duration.as_secs_f64());
}

/// Record a failed sink emit.
pub fn record_sink_error() {
    counter!("fleet_speed_sink_errors_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
