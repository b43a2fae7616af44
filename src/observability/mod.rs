//! # Observability Infrastructure
//!
//! Structured logging and lifecycle metrics for the engine.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::MetricsRecorder;

use crate::config::ObservabilityConfig;
use crate::errors::Result;

/// Initialize logging and register metric descriptions
pub fn init_observability(config: &ObservabilityConfig) -> Result<MetricsRecorder> {
    init_logging(config)?;

    let recorder = MetricsRecorder::new();
    if config.enable_metrics {
        recorder.register_lifecycle_metrics();
    }

    Ok(recorder)
}
