//! Bounded retry for backend and translation calls.
//!
//! Attempts run back to back with no delay. The loop stops at the first
//! success or at the first error that [`KeywardError::is_retryable`] rejects.

use crate::errors::{KeywardError, Result};
use crate::observability::MetricsRecorder;
use std::future::Future;
use tracing::{debug, error};

/// Attempts per retried call, one per Barbican node.
pub const MAX_RETRIES: usize = 4;

/// Run `attempt` up to [`MAX_RETRIES`] times, surfacing the last error.
pub async fn with_retries<T, F, Fut>(
    metrics: &MetricsRecorder,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<KeywardError> = None;

    for attempt_number in 1..=MAX_RETRIES {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                debug!(operation, attempt = attempt_number, error = %e, "Retryable failure");
                last_error = Some(e);
            }
        }
    }

    error!(operation, attempts = MAX_RETRIES, "Retries exhausted");
    metrics.record_retry_exhausted(operation);

    Err(last_error
        .unwrap_or_else(|| KeywardError::internal(format!("{} made no attempts", operation))))
}
