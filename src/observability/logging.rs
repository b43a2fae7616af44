//! # Structured Logging
//!
//! Span macros and subscriber setup built on the tracing ecosystem.
//!
//! Every span carries the tenant scope and correlation id of the request so
//! that a rollback logged deep inside the keystore can be joined back to the
//! request that triggered it.

use crate::config::ObservabilityConfig;
use crate::errors::{KeywardError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Create a tracing span for an orchestrator operation.
///
/// ```rust,ignore
/// let span = lifecycle_span!("create", &ctx);
/// let span = lifecycle_span!("get", &ctx, secret_id = %id);
/// ```
#[macro_export]
macro_rules! lifecycle_span {
    ($operation:expr, $ctx:expr) => {
        tracing::info_span!(
            "lifecycle_operation",
            operation = %$operation,
            correlation_id = %$ctx.correlation_id(),
            space = %$ctx.tenant().space(),
            org = %$ctx.tenant().org()
        )
    };
    ($operation:expr, $ctx:expr, $($field:tt)*) => {
        tracing::info_span!(
            "lifecycle_operation",
            operation = %$operation,
            correlation_id = %$ctx.correlation_id(),
            space = %$ctx.tenant().space(),
            org = %$ctx.tenant().org(),
            $($field)*
        )
    };
}

/// Create a tracing span for translation store operations.
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set; callers that may run more
/// than once (tests) should ignore the error.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| KeywardError::config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| KeywardError::config(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json = config.json_logging,
        "Logging initialized"
    );

    Ok(())
}
