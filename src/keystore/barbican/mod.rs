//! Barbican-backed keystore.
//!
//! Supplied material is stored directly as a Barbican secret. Generated
//! material goes through an order, and the translation row initially points
//! at the order only. Reads resolve the order lazily: once Barbican reports
//! it active, the row is promoted to carry the secret reference as well.

pub mod client;

pub use client::{
    BarbicanApi, HttpBarbicanClient, OrderMeta, OrderStatus, PayloadContentType,
    PostOrderRequest, PostSecretRequest,
};

use super::retry::with_retries;
use super::{apply_generation_defaults, KeyMaterialBackend, PayloadState};
use crate::domain::{BackendRefs, KeyState, NonactiveReason, RequestContext, Secret};
use crate::errors::{KeywardError, Result};
use crate::observability::MetricsRecorder;
use crate::rollback::RollbackLedger;
use crate::storage::{allocate_uuid, IdTranslationStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of resolving a translation row against Barbican
enum Resolution {
    /// Row carries a secret reference
    Ready(BackendRefs),
    Pending,
    GenerationFailed,
}

/// [`KeyMaterialBackend`] over the Barbican API.
pub struct BarbicanKeystore {
    api: Arc<dyn BarbicanApi>,
    store: Arc<dyn IdTranslationStore>,
    metrics: MetricsRecorder,
}

impl BarbicanKeystore {
    pub fn new(api: Arc<dyn BarbicanApi>, store: Arc<dyn IdTranslationStore>) -> Self {
        Self { api, store, metrics: MetricsRecorder::new() }
    }

    async fn translate(&self, ctx: &RequestContext, id: &str) -> Result<BackendRefs> {
        with_retries(&self.metrics, "translate_id", || self.store.get(ctx.tenant(), id)).await
    }

    async fn store_secret(
        &self,
        ctx: &RequestContext,
        secret: &mut Secret,
        ledger: &mut RollbackLedger,
    ) -> Result<String> {
        let payload = secret.payload.clone().unwrap_or_default();
        let request = PostSecretRequest {
            name: secret.name.clone(),
            payload,
            content_type: PayloadContentType::TextPlain,
        };

        let secret_ref = self.api.post_secret(ctx, &request).await.inspect_err(|e| {
            error!(correlation_id = %ctx.correlation_id(), error = %e, "Failed to store secret");
        })?;

        {
            let api = self.api.clone();
            let ctx = ctx.clone();
            let secret_ref = secret_ref.clone();
            ledger.add_fn("delete backend secret", move || {
                let api = api.clone();
                let ctx = ctx.clone();
                let secret_ref = secret_ref.clone();
                async move { api.delete_secret(&ctx, &secret_ref).await }
            });
        }

        let id = allocate_uuid(self.store.as_ref(), ctx.tenant(), BackendRefs::for_secret(secret_ref))
            .await?;

        {
            let store = self.store.clone();
            let tenant = ctx.tenant().clone();
            let id = id.clone();
            ledger.add_fn("delete translation row", move || {
                let store = store.clone();
                let tenant = tenant.clone();
                let id = id.clone();
                async move { store.delete(&tenant, &id).await }
            });
        }

        secret.set_state(KeyState::Activation, Some(NonactiveReason::KeyActive));
        Ok(id)
    }

    async fn generate_secret(&self, ctx: &RequestContext, secret: &mut Secret) -> Result<String> {
        let params = apply_generation_defaults(secret)?;
        let request = PostOrderRequest::key(OrderMeta {
            name: secret.name.clone(),
            algorithm: params.algorithm,
            bit_length: params.bit_length,
            mode: params.mode,
            payload_content_type: PayloadContentType::OctetStream.as_mime().to_string(),
        });

        let order_ref = self.api.post_order(ctx, &request).await.inspect_err(|e| {
            error!(correlation_id = %ctx.correlation_id(), error = %e, "Failed to create order");
        })?;

        // Order creation is not compensated
        let id = allocate_uuid(self.store.as_ref(), ctx.tenant(), BackendRefs::for_order(order_ref))
            .await?;

        secret.set_state(KeyState::Preactivation, None);
        Ok(id)
    }

    /// Resolve an order-only row, promoting it once the order is active.
    async fn resolve(&self, ctx: &RequestContext, mut refs: BackendRefs) -> Result<Resolution> {
        if !refs.is_unresolved() {
            return Ok(Resolution::Ready(refs));
        }
        let order_ref = refs.order_ref().unwrap_or_default().to_string();

        let status =
            with_retries(&self.metrics, "check_order", || self.api.check_order(ctx, &order_ref))
                .await?;

        match status {
            OrderStatus::Pending => Ok(Resolution::Pending),
            OrderStatus::Error { reason } => {
                warn!(order_ref = %order_ref, reason = ?reason, "Backend reported generation failure");
                Ok(Resolution::GenerationFailed)
            }
            OrderStatus::Active { secret_ref } => {
                refs.secret_ref = Some(secret_ref);
                let promoted = with_retries(&self.metrics, "promote_order", || {
                    self.store.update(ctx.tenant(), &refs)
                })
                .await;

                match promoted {
                    Ok(()) => info!(issued_id = %refs.issued_id, "Order promoted to secret"),
                    Err(e) => {
                        error!(
                            issued_id = %refs.issued_id,
                            order_ref = %order_ref,
                            error = %e,
                            "Failed to promote translation row; deleting order"
                        );
                        if let Err(e) = self.api.delete_order(ctx, &order_ref).await {
                            warn!(order_ref = %order_ref, error = %e, "Best-effort order deletion failed");
                            self.metrics.record_orphaned_order();
                        }
                    }
                }

                Ok(Resolution::Ready(refs))
            }
        }
    }
}

#[async_trait]
impl KeyMaterialBackend for BarbicanKeystore {
    #[instrument(skip_all, fields(correlation_id = %ctx.correlation_id(), space = %ctx.tenant().space()))]
    async fn create_secret(
        &self,
        ctx: &RequestContext,
        secret: &mut Secret,
        ledger: &mut RollbackLedger,
    ) -> Result<String> {
        if secret.has_payload() {
            self.store_secret(ctx, secret, ledger).await
        } else {
            self.generate_secret(ctx, secret).await
        }
    }

    #[instrument(skip(self, ctx, _ledger), fields(correlation_id = %ctx.correlation_id()))]
    async fn delete_secret(
        &self,
        ctx: &RequestContext,
        id: &str,
        _ledger: &mut RollbackLedger,
    ) -> Result<()> {
        let mut refs = self.store.get(ctx.tenant(), id).await?;

        if refs.is_unresolved() {
            let order_ref = refs.order_ref().unwrap_or_default().to_string();
            match self.api.check_order(ctx, &order_ref).await? {
                OrderStatus::Active { secret_ref } => refs.secret_ref = Some(secret_ref),
                // Only an active order can be deleted
                OrderStatus::Pending | OrderStatus::Error { .. } => {
                    debug!(order_ref = %order_ref, "Order not active; refusing delete");
                    return Err(KeywardError::conflict(
                        "Secret generation still in progress. Please try again later.",
                        "Secret",
                    ));
                }
            }
        }

        // Not compensated: destroyed material cannot be restored
        if let Some(secret_ref) = refs.secret_ref() {
            self.api.delete_secret(ctx, secret_ref).await.inspect_err(|e| {
                error!(error = %e, "Failed to delete backend secret");
            })?;
        }

        self.store.delete(ctx.tenant(), id).await.inspect_err(|e| {
            error!(error = %e, "Failed to delete translation row");
        })?;

        if let Some(order_ref) = refs.order_ref() {
            let deleted =
                with_retries(&self.metrics, "delete_order", || self.api.delete_order(ctx, order_ref))
                    .await;
            if deleted.is_err() {
                error!(order_ref = %order_ref, "CRITICAL - Cannot delete order ID");
                self.metrics.record_orphaned_order();
            }
        }

        Ok(())
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn get_payload(&self, ctx: &RequestContext, id: &str) -> Result<PayloadState> {
        let refs = self.translate(ctx, id).await?;

        let refs = match self.resolve(ctx, refs).await? {
            Resolution::Ready(refs) => refs,
            Resolution::Pending => return Ok(PayloadState::without_payload(KeyState::Preactivation)),
            Resolution::GenerationFailed => {
                return Ok(PayloadState::without_payload(KeyState::Destroyed))
            }
        };

        let secret_ref = refs
            .secret_ref()
            .ok_or_else(|| KeywardError::internal("Resolved row has no secret reference"))?;
        let accept = if refs.is_generated() {
            PayloadContentType::OctetStream
        } else {
            PayloadContentType::TextPlain
        };

        let payload = with_retries(&self.metrics, "get_payload", || {
            self.api.get_payload(ctx, secret_ref, accept)
        })
        .await?;

        Ok(PayloadState::active(payload))
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn check_secret(&self, ctx: &RequestContext, id: &str) -> Result<KeyState> {
        let refs = self.translate(ctx, id).await?;

        let state = match self.resolve(ctx, refs).await? {
            Resolution::Ready(_) => KeyState::Activation,
            Resolution::Pending => KeyState::Preactivation,
            Resolution::GenerationFailed => KeyState::Destroyed,
        };

        Ok(state)
    }
}
