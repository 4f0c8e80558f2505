//! # Observability
//!
//! - **Logging**: structured `tracing` output, see [`init_logging`]
//! - **Metrics**: lock-free counters shared by the decode pipeline, see
//!   [`RadioMetrics`]
//!
//! ```text
//!   BasicRadio ── FicRunner ── ProgramChannel ...
//!        │            │              │
//!        └── tracing::warn!() ───────┴──▶ Logging (fmt / json)
//!        └── metrics.x.inc() ────────────▶ RadioMetrics ──▶ snapshot / Prometheus text
//! ```

pub mod logging;
pub mod metrics;

use std::sync::Arc;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use metrics::{Counter, Gauge, Histogram, MetricsSnapshot, RadioMetrics};

/// Initialize logging and create a metrics instance to hand to the radio.
pub fn init(log_config: &LogConfig) -> Arc<RadioMetrics> {
    init_logging(log_config);
    Arc::new(RadioMetrics::new())
}
