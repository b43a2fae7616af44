//! Secret lifecycle business logic service
//!
//! Composes the key-material backend, the metadata service and the
//! lifecycle state machine into the request-level operations.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use validator::Validate;

use crate::{
    config::AppConfig,
    domain::{KeyState, RequestContext, Secret, MAX_PAYLOAD_LENGTH},
    errors::{KeywardError, Result},
    keystore::{build_backend, KeyMaterialBackend, PayloadState, MAX_RETRIES},
    lifecycle::{persist, reconcile, reconcile_page},
    lifecycle_span,
    metadata::{HttpMetadataClient, ListParams, MetadataService},
    observability::MetricsRecorder,
    rollback::RollbackLedger,
    storage::build_translation_store,
};

/// Parameters for creating a secret
#[derive(Debug, Clone)]
pub struct CreateSecretRequest {
    pub secret: Secret,
    /// Return the full record (and payload, when allowed) instead of the summary
    pub include_resource: bool,
}

impl CreateSecretRequest {
    pub fn new(secret: Secret) -> Self {
        Self { secret, include_resource: false }
    }

    pub fn include_resource(mut self) -> Self {
        self.include_resource = true;
        self
    }
}

/// Service orchestrating secret creation, retrieval and destruction
pub struct SecretService {
    backend: Arc<dyn KeyMaterialBackend>,
    metadata: Arc<dyn MetadataService>,
    metrics: MetricsRecorder,
}

impl SecretService {
    /// Create a new secret service
    pub fn new(backend: Arc<dyn KeyMaterialBackend>, metadata: Arc<dyn MetadataService>) -> Self {
        Self { backend, metadata, metrics: MetricsRecorder::new() }
    }

    /// Wire the configured backend, translation store and metadata client
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let store = build_translation_store(&config.database).await?;
        let backend = build_backend(&config.keystore, store)?;
        let metadata = Arc::new(HttpMetadataClient::new(&config.metadata)?);

        info!(
            keystore = ?config.keystore.backend,
            translation_store = ?config.database.store,
            "Secret service initialized"
        );

        Ok(Self::new(backend, metadata))
    }

    /// Create a secret from supplied material or by backend generation
    pub async fn create_secret(
        &self,
        ctx: &RequestContext,
        request: CreateSecretRequest,
    ) -> Result<Secret> {
        let span = lifecycle_span!("create", ctx);
        let result = self.create_inner(ctx, request).instrument(span).await;
        self.metrics.record_operation("create", result.is_ok());
        result
    }

    /// Fetch a secret, reconciling its state and attaching the payload when allowed
    pub async fn get_secret(&self, ctx: &RequestContext, id: &str) -> Result<Secret> {
        let span = lifecycle_span!("get", ctx, secret_id = %id);
        let result = self.get_inner(ctx, id).instrument(span).await;
        self.metrics.record_operation("get", result.is_ok());
        result
    }

    /// List one page of secrets, dropping any found to be destroyed
    pub async fn list_secrets(&self, ctx: &RequestContext, params: &ListParams) -> Result<Vec<Secret>> {
        let span = lifecycle_span!("list", ctx, limit = params.limit, offset = params.offset);
        let result = self.list_inner(ctx, params).instrument(span).await;
        self.metrics.record_operation("list", result.is_ok());
        result
    }

    /// Count the tenant's secrets
    pub async fn head_secrets(&self, ctx: &RequestContext, params: &ListParams) -> Result<u64> {
        let span = lifecycle_span!("head", ctx);
        let result = self.head_inner(ctx, params).instrument(span).await;
        self.metrics.record_operation("head", result.is_ok());
        result
    }

    /// Destroy a secret's material and mark its metadata deleted.
    ///
    /// With `include_resource`, the deleted record is returned along with
    /// its last payload when extractable.
    pub async fn delete_secret(
        &self,
        ctx: &RequestContext,
        id: &str,
        include_resource: bool,
    ) -> Result<Option<Secret>> {
        let span = lifecycle_span!("delete", ctx, secret_id = %id);
        let result = self.delete_inner(ctx, id, include_resource).instrument(span).await;
        self.metrics.record_operation("delete", result.is_ok());
        result
    }

    async fn create_inner(
        &self,
        ctx: &RequestContext,
        request: CreateSecretRequest,
    ) -> Result<Secret> {
        let mut secret = request.secret;
        secret.name = secret.name.trim().to_string();
        validate_new_secret(&secret)?;

        let mut ledger = RollbackLedger::new();

        let id = match self.backend.create_secret(ctx, &mut secret, &mut ledger).await {
            Ok(id) => id,
            Err(e) => return Err(self.roll_back("create", &mut ledger, e).await),
        };

        secret.id = id;
        secret.creation_date = Some(Utc::now());

        let mut stored = match self.metadata.create(ctx, &secret).await {
            Ok(stored) => stored,
            Err(e) => return Err(self.roll_back("create", &mut ledger, e).await),
        };

        ledger.complete();

        info!(secret_id = %stored.id, state = %stored.state, "Secret created");

        if stored.state == KeyState::Activation && secret.extractable {
            stored.payload = secret.payload.take();
        }

        if request.include_resource {
            Ok(stored)
        } else {
            Ok(stored.summary())
        }
    }

    async fn get_inner(&self, ctx: &RequestContext, id: &str) -> Result<Secret> {
        let mut secret = self
            .metadata
            .get(ctx, id)
            .await?
            .ok_or_else(|| KeywardError::not_found("Secret", id))?;

        if secret.state == KeyState::Destroyed {
            return Ok(secret);
        }

        // Deleted records have no backend material left to observe
        if secret.deleted {
            let outcome = reconcile(&secret, None, Utc::now());
            persist(self.metadata.as_ref(), &self.metrics, ctx, &mut secret, outcome).await?;
            return Ok(secret);
        }

        let observed = self.backend.get_payload(ctx, id).await.inspect_err(|e| {
            error!(error = %e, "Unable to retrieve secret payload");
        })?;

        let outcome = reconcile(&secret, Some(observed.state), Utc::now());
        persist(self.metadata.as_ref(), &self.metrics, ctx, &mut secret, outcome).await?;

        secret.payload = observed.payload;
        secret.redact_unless_extractable();
        Ok(secret)
    }

    async fn list_inner(&self, ctx: &RequestContext, params: &ListParams) -> Result<Vec<Secret>> {
        params.validate()?;

        let mut secrets = self.metadata.list(ctx, params).await?;
        reconcile_page(
            self.backend.as_ref(),
            self.metadata.as_ref(),
            &self.metrics,
            ctx,
            &mut secrets,
            Utc::now(),
        )
        .await;
        secrets.retain(|secret| secret.state != KeyState::Destroyed);

        Ok(secrets)
    }

    async fn head_inner(&self, ctx: &RequestContext, params: &ListParams) -> Result<u64> {
        params.validate()?;
        self.metadata.total(ctx, params).await
    }

    async fn delete_inner(
        &self,
        ctx: &RequestContext,
        id: &str,
        include_resource: bool,
    ) -> Result<Option<Secret>> {
        // Delete registers no compensations; the ledger only brackets the request
        let mut ledger = RollbackLedger::new();
        let result = self.destroy(ctx, id, include_resource, &mut ledger).await;
        ledger.complete();
        result
    }

    async fn destroy(
        &self,
        ctx: &RequestContext,
        id: &str,
        include_resource: bool,
        ledger: &mut RollbackLedger,
    ) -> Result<Option<Secret>> {
        let prefetched = if include_resource {
            Some(self.prefetch_payload(ctx, id).await?)
        } else {
            None
        };

        self.backend.delete_secret(ctx, id, ledger).await?;
        let mut deleted = self.metadata.delete(ctx, id).await?;

        info!(secret_id = %id, "Secret deleted");

        Ok(prefetched.map(|observed| {
            if deleted.extractable {
                deleted.payload = observed.payload;
            }
            deleted
        }))
    }

    /// Fetch the payload before deletion, giving pending generation a few chances to finish
    async fn prefetch_payload(&self, ctx: &RequestContext, id: &str) -> Result<PayloadState> {
        let mut last = self.backend.get_payload(ctx, id).await;
        let mut attempts = 1;
        while attempts < MAX_RETRIES
            && matches!(&last, Ok(observed) if observed.state == KeyState::Preactivation)
        {
            last = self.backend.get_payload(ctx, id).await;
            attempts += 1;
        }

        let observed = last.inspect_err(|e| {
            error!(error = %e, "Unable to retrieve secret payload before delete");
        })?;

        if observed.state == KeyState::Preactivation {
            return Err(KeywardError::conflict(
                "Unable to delete secret while key is still generating.",
                "Secret",
            ));
        }

        Ok(observed)
    }

    /// Run the ledger after a failed step and hand back the original error
    async fn roll_back(
        &self,
        operation: &str,
        ledger: &mut RollbackLedger,
        cause: KeywardError,
    ) -> KeywardError {
        warn!(error = %cause, pending = ledger.len(), "Rolling back");

        let complete = match ledger.clean().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Rollback incomplete");
                false
            }
        };
        self.metrics.record_rollback(operation, complete);

        cause
    }
}

fn validate_new_secret(secret: &Secret) -> Result<()> {
    secret.validate()?;

    if let Some(payload) = &secret.payload {
        if payload.char_len() > MAX_PAYLOAD_LENGTH {
            return Err(KeywardError::validation_field("Payload too long", "payload"));
        }
    }

    Ok(())
}
