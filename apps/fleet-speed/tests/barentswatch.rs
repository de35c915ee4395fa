//! BarentsWatch Integration Tests
//!
//! Drives the pipeline through the real HTTP adapters against a mock
//! identity server and stream endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, TimeDelta, Utc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleet_speed::application::services::ingestor::IngestError;
use fleet_speed::infrastructure::barentswatch::{
    BarentswatchTransport, ClientCredentials, JsonFrameDecoder, OauthTokenSource,
};
use fleet_speed::infrastructure::sink::ChannelSink;
use fleet_speed::{FeedState, Pipeline, PipelineConfig, PipelineError, PipelinePorts};

async fn mock_identity(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "live-token",
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "ais"
        })))
        .mount(server)
        .await;
}

fn ports(server: &MockServer, sink: ChannelSink) -> PipelinePorts {
    let http = reqwest::Client::new();
    PipelinePorts {
        token_source: Arc::new(OauthTokenSource::new(
            http.clone(),
            format!("{}/connect/token", server.uri()),
            ClientCredentials::new("client", "secret"),
        )),
        transport: Arc::new(
            BarentswatchTransport::new(http, format!("{}/v1/ais", server.uri()))
                .with_max_frame_bytes(512),
        ),
        decoder: Arc::new(JsonFrameDecoder::new()),
        sink: Arc::new(sink),
    }
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.report_interval = Duration::from_millis(100);
    config.ingestor.reconnect.initial_delay = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn streams_positions_from_the_live_endpoint() {
    let server = MockServer::start().await;
    mock_identity(&server).await;

    let t0 = Utc::now().trunc_subsecs(0) - TimeDelta::seconds(20);
    let body = [
        format!(
            r#"{{"type":"Position","mmsi":258000001,"msgtime":"{}","latitude":70.1,"longitude":19.0,"speedOverGround":14.2}}"#,
            t0.to_rfc3339()
        ),
        format!(
            r#"{{"type":"Position","mmsi":"258000002","msgtime":"{}","latitude":70.2,"longitude":19.1,"speedOverGround":31.0}}"#,
            (t0 + TimeDelta::seconds(2)).naive_utc().format("%Y-%m-%dT%H:%M:%S")
        ),
        format!(r#"{{"type":"Staticdata","mmsi":258000001,"name":"{}"}}"#, "X".repeat(600)),
        r#"{"type":"Staticdata","mmsi":258000002,"name":"POLARSTJERNA"}"#.to_string(),
    ]
    .join("\n");

    Mock::given(method("POST"))
        .and(path("/v1/ais"))
        .and(header("authorization", "Bearer live-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let (sink, mut snapshots) = ChannelSink::new(32);
    let state = Arc::new(FeedState::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::new(config(), ports(&server, sink), Arc::clone(&state));
    let task = tokio::spawn(pipeline.run(cancel.clone()));

    let snapshot = timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = snapshots.recv().await.unwrap();
            if snapshot.window_count >= 2 {
                return snapshot;
            }
        }
    })
    .await
    .expect("no snapshot with both positions");

    assert_eq!(snapshot.window_count, 2);
    let leaders: Vec<u32> = snapshot.ranking.iter().map(|v| v.mmsi.value()).collect();
    assert_eq!(leaders, vec![258_000_002, 258_000_001]);

    let status = state.status();
    assert_eq!(status.messages_received, 2);
    assert_eq!(status.frames_skipped, 1);

    cancel.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn repeated_feed_errors_exhaust_reconnects() {
    let server = MockServer::start().await;
    mock_identity(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/ais"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let mut config = config();
    config.ingestor.reconnect.initial_delay = Duration::from_millis(10);
    config.ingestor.reconnect.max_delay = Duration::from_millis(20);
    config.ingestor.reconnect.max_attempts = 2;

    let (sink, _snapshots) = ChannelSink::new(32);
    let state = Arc::new(FeedState::new());
    let pipeline = Pipeline::new(config, ports(&server, sink), Arc::clone(&state));

    let result = timeout(Duration::from_secs(5), pipeline.run(CancellationToken::new()))
        .await
        .unwrap();
    match result {
        Err(PipelineError::Ingest(IngestError::ReconnectExhausted { attempts, last })) => {
            assert_eq!(attempts, 2);
            assert_eq!(last.kind(), "http");
        }
        other => panic!("expected reconnect exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_bytes_do_not_end_the_session() {
    let server = MockServer::start().await;
    mock_identity(&server).await;

    let t0 = Utc::now().trunc_subsecs(0) - TimeDelta::seconds(5);
    let position = |mmsi: u32, speed: f64| {
        format!(
            r#"{{"type":"Position","mmsi":{mmsi},"msgtime":"{}","latitude":70.1,"longitude":19.0,"speedOverGround":{speed}}}"#,
            t0.to_rfc3339()
        )
    };
    let mut body = position(258_000_001, 9.5).into_bytes();
    body.extend_from_slice(b"\n\xff\xfe{\"mmsi\":\n");
    body.extend_from_slice(position(258_000_002, 12.0).as_bytes());
    body.push(b'\n');

    Mock::given(method("POST"))
        .and(path("/v1/ais"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let (sink, mut snapshots) = ChannelSink::new(32);
    let state = Arc::new(FeedState::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::new(config(), ports(&server, sink), Arc::clone(&state));
    let task = tokio::spawn(pipeline.run(cancel.clone()));

    timeout(Duration::from_secs(5), async {
        while snapshots.recv().await.unwrap().window_count < 2 {}
    })
    .await
    .expect("both positions should arrive in one session");

    let status = state.status();
    assert_eq!(status.messages_received, 2);
    assert_eq!(status.decode_failures, 1);

    let opens = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/v1/ais")
        .count();
    assert_eq!(opens, 1);

    cancel.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
