//! Telemetry for the contract graph engine
//!
//! - `metrics` - Prometheus metrics for validation, apply, change checks,
//!   search and store sessions
//!
//! Logging goes through `tracing`; installing a subscriber is left to the
//! binary.

pub mod metrics;

pub use metrics::{ApplyTimer, EngineMetrics, MetricsRegistry};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
