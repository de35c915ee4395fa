//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// BarentsWatch token, stream and frame adapters.
pub mod barentswatch;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Snapshot output adapters.
pub mod sink;

/// OpenTelemetry tracing integration.
pub mod telemetry;
