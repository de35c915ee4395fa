//! Fleet Speed Configuration Settings
//!
//! Configuration types for the service, loaded from environment variables.
//! Numeric values that fail to parse fall back to their defaults; durations
//! outside their allowed range, invalid enumerations and inconsistent
//! ranking settings are errors.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::application::services::aggregator::AggregatorConfig;
use crate::application::services::auth_client::AuthConfig;
use crate::application::services::backoff::BackoffConfig;
use crate::application::services::ingestor::IngestorConfig;
use crate::application::services::pipeline::PipelineConfig;
use crate::application::services::queue::BackpressurePolicy;
use crate::application::services::reporter::REPORT_INTERVAL;
use crate::domain::ranking::{RankingConfig, RankingConfigError, RankingEngine};
use crate::infrastructure::barentswatch::{
    AIS_SCOPE, ClientCredentials, DEFAULT_MAX_FRAME_BYTES, DEFAULT_STREAM_URL, DEFAULT_TOKEN_URL,
};

const HOUR_SECS: u64 = 3600;
const DAY_SECS: u64 = 24 * HOUR_SECS;

/// Connect and read timeouts.
const TIMEOUT_SECS: RangeInclusive<u64> = 1..=HOUR_SECS;
/// Trailing window and compaction period; both must tick.
const PERIOD_SECS: RangeInclusive<u64> = 1..=DAY_SECS;
/// Ranking tolerance, window and threshold.
const RANKING_SECS: RangeInclusive<u64> = 0..=30 * DAY_SECS;
/// Token refresh margin and reconnect delay cap.
const MARGIN_SECS: RangeInclusive<u64> = 0..=DAY_SECS;
const INITIAL_DELAY_MILLIS: RangeInclusive<u64> = 0..=HOUR_SECS * 1000;

/// Snapshot output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Structured `tracing` events.
    #[default]
    Log,
    /// One JSON object per line on stdout.
    Json,
}

impl OutputFormat {
    /// Parse an output format, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns the rejected value if it names no format.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}' (expected log or json)")),
        }
    }

    /// Format name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Json => "json",
        }
    }
}

/// Feed endpoints and session limits.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// OAuth token endpoint.
    pub token_url: String,
    /// Live AIS stream endpoint.
    pub stream_url: String,
    /// Requested OAuth scope.
    pub scope: String,
    /// Limit on opening a session.
    pub connect_timeout: Duration,
    /// Limit on the gap between frames.
    pub read_timeout: Duration,
    /// Longest accepted frame.
    pub max_frame_bytes: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            scope: AIS_SCOPE.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Reconnection and token refresh settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Refresh the token when it expires within this margin.
    pub token_refresh_margin: Duration,
    /// Token requests per refresh before giving up.
    pub auth_max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
            token_refresh_margin: Duration::from_secs(60),
            auth_max_attempts: 5,
        }
    }
}

/// Window, ranking and queue settings.
#[derive(Debug, Clone)]
pub struct AggregationSettings {
    /// Trailing window for the message count.
    pub window: Duration,
    /// Ranking length.
    pub top_k: usize,
    /// Staleness limits.
    pub ranking: RankingConfig,
    /// Interval between compaction passes.
    pub compaction_interval: Duration,
    /// Message queue capacity.
    pub queue_capacity: usize,
    /// Behavior when the queue is full.
    pub backpressure: BackpressurePolicy,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            top_k: 10,
            ranking: RankingConfig::default(),
            compaction_interval: Duration::from_secs(30),
            queue_capacity: 4096,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct FleetSpeedConfig {
    /// OAuth client credentials.
    pub credentials: ClientCredentials,
    /// Feed endpoints and limits.
    pub feed: FeedSettings,
    /// Reconnection and token refresh.
    pub reconnect: ReconnectSettings,
    /// Window, ranking and queue.
    pub aggregation: AggregationSettings,
    /// Snapshot output format.
    pub output: OutputFormat,
    /// Server ports.
    pub server: ServerSettings,
}

impl FleetSpeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or empty, a duration is
    /// out of range, an enumerated value is unknown, or the ranking settings
    /// are inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`FleetSpeedConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let client_id = env.required("BARENTSWATCH_CLIENT_ID")?;
        let client_secret = env.required("BARENTSWATCH_CLIENT_SECRET")?;

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            token_url: env.string("FLEET_SPEED_TOKEN_URL", feed_defaults.token_url),
            stream_url: env.string("FLEET_SPEED_STREAM_URL", feed_defaults.stream_url),
            scope: env.string("FLEET_SPEED_SCOPE", feed_defaults.scope),
            connect_timeout: env.duration_secs(
                "FLEET_SPEED_CONNECT_TIMEOUT_SECS",
                feed_defaults.connect_timeout,
                TIMEOUT_SECS,
            )?,
            read_timeout: env.duration_secs(
                "FLEET_SPEED_READ_TIMEOUT_SECS",
                feed_defaults.read_timeout,
                TIMEOUT_SECS,
            )?,
            max_frame_bytes: env.parse("FLEET_SPEED_MAX_FRAME_BYTES", feed_defaults.max_frame_bytes),
        };

        let reconnect_defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            reconnect_delay_initial: env.duration_millis(
                "FLEET_SPEED_RECONNECT_DELAY_INITIAL_MS",
                reconnect_defaults.reconnect_delay_initial,
                INITIAL_DELAY_MILLIS,
            )?,
            reconnect_delay_max: env.duration_secs(
                "FLEET_SPEED_RECONNECT_DELAY_MAX_SECS",
                reconnect_defaults.reconnect_delay_max,
                MARGIN_SECS,
            )?,
            reconnect_delay_multiplier: env.multiplier(
                "FLEET_SPEED_RECONNECT_DELAY_MULTIPLIER",
                reconnect_defaults.reconnect_delay_multiplier,
            )?,
            max_reconnect_attempts: env.parse(
                "FLEET_SPEED_MAX_RECONNECT_ATTEMPTS",
                reconnect_defaults.max_reconnect_attempts,
            ),
            token_refresh_margin: env.duration_secs(
                "FLEET_SPEED_TOKEN_REFRESH_MARGIN_SECS",
                reconnect_defaults.token_refresh_margin,
                MARGIN_SECS,
            )?,
            auth_max_attempts: env.parse(
                "FLEET_SPEED_AUTH_MAX_ATTEMPTS",
                reconnect_defaults.auth_max_attempts,
            ),
        };

        let aggregation_defaults = AggregationSettings::default();
        let ranking = RankingConfig {
            staleness_tolerance: env.duration_secs(
                "FLEET_SPEED_STALENESS_TOLERANCE_SECS",
                aggregation_defaults.ranking.staleness_tolerance,
                RANKING_SECS,
            )?,
            ranking_window: env.duration_secs(
                "FLEET_SPEED_RANKING_WINDOW_SECS",
                aggregation_defaults.ranking.ranking_window,
                RANKING_SECS,
            )?,
            staleness_threshold: env.duration_secs(
                "FLEET_SPEED_STALENESS_THRESHOLD_SECS",
                aggregation_defaults.ranking.staleness_threshold,
                RANKING_SECS,
            )?,
        };
        RankingEngine::new(ranking)?;

        let backpressure = match env.get("FLEET_SPEED_BACKPRESSURE") {
            Some(raw) => raw.parse::<BackpressurePolicy>().map_err(|reason| ConfigError::Invalid {
                key: "FLEET_SPEED_BACKPRESSURE".to_string(),
                reason,
            })?,
            None => aggregation_defaults.backpressure,
        };

        let aggregation = AggregationSettings {
            window: env.duration_secs(
                "FLEET_SPEED_WINDOW_SECS",
                aggregation_defaults.window,
                PERIOD_SECS,
            )?,
            top_k: env.parse("FLEET_SPEED_TOP_K", aggregation_defaults.top_k),
            ranking,
            compaction_interval: env.duration_secs(
                "FLEET_SPEED_COMPACTION_INTERVAL_SECS",
                aggregation_defaults.compaction_interval,
                PERIOD_SECS,
            )?,
            queue_capacity: env.parse(
                "FLEET_SPEED_QUEUE_CAPACITY",
                aggregation_defaults.queue_capacity,
            ),
            backpressure,
        };

        let output = match env.get("FLEET_SPEED_OUTPUT") {
            Some(raw) => OutputFormat::parse(&raw).map_err(|reason| ConfigError::Invalid {
                key: "FLEET_SPEED_OUTPUT".to_string(),
                reason,
            })?,
            None => OutputFormat::default(),
        };

        let server = ServerSettings {
            health_port: env.parse("FLEET_SPEED_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            credentials: ClientCredentials::new(client_id, client_secret),
            feed,
            reconnect,
            aggregation,
            output,
            server,
        })
    }

    /// Pipeline settings derived from this configuration.
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        let reconnect = &self.reconnect;
        let aggregation = &self.aggregation;

        PipelineConfig {
            window: aggregation.window,
            ranking: aggregation.ranking,
            aggregator: AggregatorConfig {
                top_k: aggregation.top_k,
                compaction_interval: aggregation.compaction_interval,
            },
            queue_capacity: aggregation.queue_capacity,
            backpressure: aggregation.backpressure,
            ingestor: IngestorConfig {
                connect_timeout: self.feed.connect_timeout,
                read_timeout: self.feed.read_timeout,
                reconnect: BackoffConfig {
                    initial_delay: reconnect.reconnect_delay_initial,
                    max_delay: reconnect.reconnect_delay_max,
                    multiplier: reconnect.reconnect_delay_multiplier,
                    max_attempts: reconnect.max_reconnect_attempts,
                    ..BackoffConfig::default()
                },
            },
            auth: AuthConfig {
                refresh_margin: reconnect.token_refresh_margin,
                max_attempts: reconnect.auth_max_attempts,
                ..AuthConfig::default()
            },
            report_interval: REPORT_INTERVAL,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value outside its allowed set.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// What was wrong.
        reason: String,
    },
    /// Ranking durations are inconsistent.
    #[error(transparent)]
    Ranking(#[from] RankingConfigError),
}

// =============================================================================
// Variable Lookup
// =============================================================================

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn string(&self, key: &str, default: String) -> String {
        self.get(key).filter(|v| !v.is_empty()).unwrap_or(default)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn bounded(&self, key: &str, bounds: &RangeInclusive<u64>) -> Result<Option<u64>, ConfigError> {
        match self.get(key).and_then(|v| v.trim().parse::<u64>().ok()) {
            Some(value) if !bounds.contains(&value) => Err(ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("{value} is outside {}..={}", bounds.start(), bounds.end()),
            }),
            parsed => Ok(parsed),
        }
    }

    fn duration_secs(
        &self,
        key: &str,
        default: Duration,
        bounds: RangeInclusive<u64>,
    ) -> Result<Duration, ConfigError> {
        Ok(self.bounded(key, &bounds)?.map_or(default, Duration::from_secs))
    }

    fn duration_millis(
        &self,
        key: &str,
        default: Duration,
        bounds: RangeInclusive<u64>,
    ) -> Result<Duration, ConfigError> {
        Ok(self.bounded(key, &bounds)?.map_or(default, Duration::from_millis))
    }

    fn multiplier(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let value = self.parse(key, default);
        if !value.is_finite() || value < 1.0 {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("{value} must be a finite factor of at least 1"),
            });
        }
        Ok(value)
    }
}
