//! # Lifecycle State Machine
//!
//! Reconciles the lifecycle state cached by the metadata service against
//! the secret's validity window and the latest backend observation.
//!
//! [`reconcile`] is pure; [`persist`] and [`reconcile_page`] write the
//! outcome back through a [`MetadataService`].
//!
//! ## Rules
//!
//! | cached state    | outcome                                                        |
//! |-----------------|----------------------------------------------------------------|
//! | `Destroyed`     | unchanged                                                      |
//! | any, backend reports `Destroyed` | `Destroyed` / `GenerationFailed`              |
//! | `Deactivated` and deleted | `Destroyed`, reason kept                             |
//! | `Preactivation` | backend active: by activation date; otherwise unchanged        |
//! | `Activation`, `Suspended` | expired: `Deactivated` / `Expired`; else by activation date |
//! | `Deactivated`   | by activation date                                             |
//!
//! "By activation date" means `Activation`/`KeyActive` once the activation
//! date has passed (or when none is set) and `Preactivation` before it.

use crate::domain::{KeyState, NonactiveReason, RequestContext, Secret};
use crate::errors::Result;
use crate::keystore::KeyMaterialBackend;
use crate::metadata::{MetadataService, StateUpdate};
use crate::observability::MetricsRecorder;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

/// Result of reconciling one secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub state: KeyState,
    pub reason: Option<NonactiveReason>,
    /// Computed state differs from the cached one
    pub changed: bool,
    /// Backend reported that generation failed
    pub generation_failed: bool,
}

impl Reconciliation {
    fn unchanged(secret: &Secret) -> Self {
        Self {
            state: secret.state,
            reason: secret.nonactive_reason,
            changed: false,
            generation_failed: false,
        }
    }

    fn to(secret: &Secret, state: KeyState, reason: Option<NonactiveReason>) -> Self {
        Self { state, reason, changed: state != secret.state, generation_failed: false }
    }
}

fn is_expired(secret: &Secret, now: DateTime<Utc>) -> bool {
    secret.expiration_date.is_some_and(|expiration| now > expiration)
}

fn is_activation_due(secret: &Secret, now: DateTime<Utc>) -> bool {
    secret.activation_date.map_or(true, |activation| now > activation)
}

fn by_activation_date(secret: &Secret, now: DateTime<Utc>) -> Reconciliation {
    if is_activation_due(secret, now) {
        Reconciliation::to(secret, KeyState::Activation, Some(NonactiveReason::KeyActive))
    } else {
        Reconciliation::to(secret, KeyState::Preactivation, None)
    }
}

/// Compute the state `secret` should be in at `now`.
///
/// `backend` is the state the key-material backend reported, if it was
/// consulted.
pub fn reconcile(secret: &Secret, backend: Option<KeyState>, now: DateTime<Utc>) -> Reconciliation {
    if secret.state == KeyState::Destroyed {
        return Reconciliation::unchanged(secret);
    }

    if backend == Some(KeyState::Destroyed) {
        return Reconciliation {
            state: KeyState::Destroyed,
            reason: Some(NonactiveReason::GenerationFailed),
            changed: true,
            generation_failed: true,
        };
    }

    // Records deleted while deactivated were once left in the wrong state
    if secret.deleted && secret.state == KeyState::Deactivated {
        return Reconciliation::to(secret, KeyState::Destroyed, secret.nonactive_reason);
    }

    match secret.state {
        KeyState::Preactivation if backend != Some(KeyState::Activation) => {
            Reconciliation::unchanged(secret)
        }
        state if state.evaluates_expiration() && is_expired(secret, now) => {
            Reconciliation::to(secret, KeyState::Deactivated, Some(NonactiveReason::Expired))
        }
        _ => by_activation_date(secret, now),
    }
}

/// Write a reconciliation back to the metadata service and onto `secret`.
///
/// A generation failure deletes the record before recording the new state.
/// Nothing is written when the state did not change.
pub async fn persist(
    metadata: &dyn MetadataService,
    metrics: &MetricsRecorder,
    ctx: &RequestContext,
    secret: &mut Secret,
    outcome: Reconciliation,
) -> Result<()> {
    if !outcome.changed {
        return Ok(());
    }

    let update = StateUpdate { state: outcome.state, nonactive_reason: outcome.reason };

    if outcome.generation_failed {
        warn!(secret_id = %secret.id, "Generation failed; deleting metadata");
        metadata.delete(ctx, &secret.id).await?;
        secret.deleted = true;
    }
    metadata.update_state(ctx, &secret.id, update).await?;

    metrics.record_state_transition(secret.state.as_str(), outcome.state.as_str());
    debug!(
        secret_id = %secret.id,
        from = %secret.state,
        to = %outcome.state,
        "Lifecycle state persisted"
    );

    secret.set_state(outcome.state, outcome.reason);
    Ok(())
}

/// Reconcile a page of secrets in place.
///
/// Every `Preactivation` secret is checked against the backend concurrently.
/// The results are then applied one secret at a time. A failed backend check
/// leaves that secret as cached; a failed write is logged and skipped.
pub async fn reconcile_page(
    backend: &dyn KeyMaterialBackend,
    metadata: &dyn MetadataService,
    metrics: &MetricsRecorder,
    ctx: &RequestContext,
    secrets: &mut [Secret],
    now: DateTime<Utc>,
) {
    let checks = secrets.iter().map(|secret| async move {
        if secret.state != KeyState::Preactivation {
            return None;
        }
        match backend.check_secret(ctx, &secret.id).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(secret_id = %secret.id, error = %e, "Backend check failed");
                None
            }
        }
    });
    let observations = join_all(checks).await;

    for (secret, observed) in secrets.iter_mut().zip(observations) {
        let outcome = reconcile(secret, observed, now);
        if let Err(e) = persist(metadata, metrics, ctx, secret, outcome).await {
            warn!(secret_id = %secret.id, error = %e, "Failed to persist lifecycle state");
        }
    }
}
