//! Configuration Module
//!
//! Environment-driven settings for the fleet speed service.

mod settings;

pub use settings::{
    AggregationSettings, ConfigError, FeedSettings, FleetSpeedConfig, OutputFormat,
    ReconnectSettings, ServerSettings,
};
