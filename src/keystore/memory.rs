//! In-memory key-material backend for development and tests.
//!
//! Material is held in a map keyed by a synthetic secret reference. There
//! are no orders: generated material is produced immediately and every
//! secret starts in `Activation`.

use super::{apply_generation_defaults, KeyMaterialBackend, PayloadState};
use crate::domain::{BackendRefs, KeyState, NonactiveReason, RequestContext, Secret, SecretString};
use crate::errors::{KeywardError, Result};
use crate::rollback::RollbackLedger;
use crate::storage::{allocate_uuid, IdTranslationStore};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, instrument};

/// [`KeyMaterialBackend`] holding material in process memory.
pub struct MemoryKeystore {
    store: Arc<dyn IdTranslationStore>,
    material: Arc<DashMap<String, SecretString>>,
}

impl MemoryKeystore {
    pub fn new(store: Arc<dyn IdTranslationStore>) -> Self {
        Self { store, material: Arc::new(DashMap::new()) }
    }

    /// Number of secrets currently holding material
    pub fn material_count(&self) -> usize {
        self.material.len()
    }

    fn generate_material(bit_length: u32) -> SecretString {
        let mut bytes = vec![0u8; (bit_length as usize).div_ceil(8)];
        rand::thread_rng().fill_bytes(&mut bytes);
        SecretString::new(STANDARD.encode(&bytes))
    }

    async fn secret_ref(&self, ctx: &RequestContext, id: &str) -> Result<String> {
        let refs = self.store.get(ctx.tenant(), id).await?;
        refs.secret_ref()
            .map(str::to_string)
            .ok_or_else(|| KeywardError::not_found("Secret", id))
    }
}

#[async_trait]
impl KeyMaterialBackend for MemoryKeystore {
    #[instrument(skip_all, fields(correlation_id = %ctx.correlation_id()))]
    async fn create_secret(
        &self,
        ctx: &RequestContext,
        secret: &mut Secret,
        ledger: &mut RollbackLedger,
    ) -> Result<String> {
        let payload = match secret.payload.clone().filter(|p| !p.is_empty()) {
            Some(payload) => payload,
            None => Self::generate_material(apply_generation_defaults(secret)?.bit_length),
        };

        let secret_ref = uuid::Uuid::new_v4().to_string();
        self.material.insert(secret_ref.clone(), payload);

        {
            let material = self.material.clone();
            let secret_ref = secret_ref.clone();
            ledger.add_fn("delete memory material", move || {
                material.remove(&secret_ref);
                futures::future::ready(Ok(()))
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
        debug!("Material stored in memory");
        Ok(id)
    }

    async fn delete_secret(
        &self,
        ctx: &RequestContext,
        id: &str,
        _ledger: &mut RollbackLedger,
    ) -> Result<()> {
        let secret_ref = self.secret_ref(ctx, id).await?;
        self.material.remove(&secret_ref);
        self.store.delete(ctx.tenant(), id).await
    }

    async fn get_payload(&self, ctx: &RequestContext, id: &str) -> Result<PayloadState> {
        let secret_ref = self.secret_ref(ctx, id).await?;
        let payload = self
            .material
            .get(&secret_ref)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| KeywardError::not_found("Secret", id))?;

        Ok(PayloadState::active(payload))
    }

    async fn check_secret(&self, ctx: &RequestContext, id: &str) -> Result<KeyState> {
        let secret_ref = self.secret_ref(ctx, id).await?;
        if self.material.contains_key(&secret_ref) {
            Ok(KeyState::Activation)
        } else {
            Ok(KeyState::Destroyed)
        }
    }
}
