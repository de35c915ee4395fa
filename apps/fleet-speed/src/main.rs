//! Fleet Speed Binary
//!
//! Streams live AIS positions and reports traffic volume and the fastest
//! vessels once per second.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin fleet-speed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `BARENTSWATCH_CLIENT_ID`: BarentsWatch API client id
//! - `BARENTSWATCH_CLIENT_SECRET`: BarentsWatch API client secret
//!
//! ## Optional
//! - `FLEET_SPEED_OUTPUT`: log | json (default: log)
//! - `FLEET_SPEED_TOP_K`: Ranking length (default: 10)
//! - `FLEET_SPEED_WINDOW_SECS`: Trailing window (default: 10)
//! - `FLEET_SPEED_BACKPRESSURE`: block | drop-oldest (default: block)
//! - `FLEET_SPEED_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log filter (default: `fleet_speed=info`)
//!
//! See `FleetSpeedConfig` for the full list.

use std::sync::Arc;

use anyhow::Context;
use fleet_speed::application::ports::SnapshotSink;
use fleet_speed::infrastructure::barentswatch::{
    BarentswatchTransport, JsonFrameDecoder, OauthTokenSource,
};
use fleet_speed::infrastructure::sink::{JsonLinesSink, TracingSink};
use fleet_speed::infrastructure::telemetry;
use fleet_speed::{
    FeedState, FleetSpeedConfig, HealthServer, HealthServerState, OutputFormat, Pipeline,
    PipelinePorts, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Fleet Speed");

    init_metrics().context("failed to install metrics recorder")?;

    let config = FleetSpeedConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let feed_state = Arc::new(FeedState::new());

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&feed_state),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let http = reqwest::Client::builder()
        .connect_timeout(config.feed.connect_timeout)
        .user_agent(concat!("fleet-speed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let sink: Arc<dyn SnapshotSink> = match config.output {
        OutputFormat::Log => Arc::new(TracingSink),
        OutputFormat::Json => Arc::new(JsonLinesSink::stdout()),
    };
    let ports = PipelinePorts {
        token_source: Arc::new(
            OauthTokenSource::new(
                http.clone(),
                config.feed.token_url.clone(),
                config.credentials.clone(),
            )
            .with_scope(config.feed.scope.clone()),
        ),
        transport: Arc::new(
            BarentswatchTransport::new(http, config.feed.stream_url.clone())
                .with_max_frame_bytes(config.feed.max_frame_bytes),
        ),
        decoder: Arc::new(JsonFrameDecoder::new()),
        sink,
    };

    let pipeline = Pipeline::new(config.pipeline_config(), ports, Arc::clone(&feed_state));
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    tracing::info!("Fleet Speed ready");

    let result = pipeline.run(shutdown_token.clone()).await;
    shutdown_token.cancel();

    let summary = result.context("pipeline stopped on a fatal error")?;
    tracing::info!(
        snapshots = summary.snapshots_emitted,
        messages = summary.messages_received,
        "Fleet Speed stopped"
    );
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &FleetSpeedConfig) {
    tracing::info!(
        output = config.output.as_str(),
        top_k = config.aggregation.top_k,
        window_secs = config.aggregation.window.as_secs(),
        backpressure = %config.aggregation.backpressure,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        token_url = %config.feed.token_url,
        stream_url = %config.feed.stream_url,
        client_id = %config.credentials.client_id,
        "Feed endpoints"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
