//! # Metrics Collection
//!
//! Lifecycle counters recorded through the `metrics` facade. Installing an
//! exporter is left to the embedding process; without one every call is a
//! no-op.

use metrics::{counter, describe_counter, Unit};

/// Metrics recorder that tracks lifecycle engine events
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a completed orchestrator operation
    pub fn record_operation(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("operation", operation.to_string()), ("status", status.to_string())];
        counter!("keyward_operations_total", &labels).increment(1);
    }

    /// Record a ledger rollback and whether every compensation succeeded
    pub fn record_rollback(&self, operation: &str, complete: bool) {
        let labels = [("operation", operation.to_string())];
        counter!("keyward_rollbacks_total", &labels).increment(1);
        if !complete {
            counter!("keyward_rollback_failures_total", &labels).increment(1);
        }
    }

    /// Record a retry loop that ran out of attempts
    pub fn record_retry_exhausted(&self, operation: &str) {
        let labels = [("operation", operation.to_string())];
        counter!("keyward_retries_exhausted_total", &labels).increment(1);
    }

    /// Record a persisted lifecycle state transition
    pub fn record_state_transition(&self, from: &str, to: &str) {
        let labels = [("from", from.to_string()), ("to", to.to_string())];
        counter!("keyward_state_transitions_total", &labels).increment(1);
    }

    /// Record a backend order that could not be deleted
    pub fn record_orphaned_order(&self) {
        counter!("keyward_orphaned_orders_total").increment(1);
    }

    /// Register descriptions so exporters list the counters before events occur
    pub fn register_lifecycle_metrics(&self) {
        describe_counter!(
            "keyward_operations_total",
            Unit::Count,
            "Orchestrator operations grouped by outcome"
        );
        describe_counter!("keyward_rollbacks_total", Unit::Count, "Ledger rollbacks executed");
        describe_counter!(
            "keyward_rollback_failures_total",
            Unit::Count,
            "Rollbacks halted by a failing compensation"
        );
        describe_counter!(
            "keyward_retries_exhausted_total",
            Unit::Count,
            "Bounded retry loops that exhausted every attempt"
        );
        describe_counter!(
            "keyward_state_transitions_total",
            Unit::Count,
            "Lifecycle state changes written to the metadata service"
        );
        describe_counter!(
            "keyward_orphaned_orders_total",
            Unit::Count,
            "Backend orders left behind for the background sweep"
        );
    }
}
