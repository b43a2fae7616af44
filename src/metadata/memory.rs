//! In-memory metadata service for development and tests.

use super::{ListParams, MetadataService, StateUpdate};
use crate::domain::{KeyState, RequestContext, Secret, TenantContext};
use crate::errors::{KeywardError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

type RecordKey = (String, String, String);

fn key(tenant: &TenantContext, id: &str) -> RecordKey {
    (tenant.space().to_string(), tenant.org().to_string(), id.to_string())
}

/// [`MetadataService`] over a concurrent map, partitioned by tenant.
#[derive(Debug, Default)]
pub struct InMemoryMetadataService {
    records: DashMap<RecordKey, Secret>,
}

impl InMemoryMetadataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record directly, bypassing `create`
    pub fn seed(&self, tenant: &TenantContext, secret: Secret) {
        self.records.insert(key(tenant, &secret.id), secret);
    }

    fn live_sorted(&self, tenant: &TenantContext) -> Vec<Secret> {
        let mut live: Vec<Secret> = self
            .records
            .iter()
            .filter(|entry| {
                let (space, org, _) = entry.key();
                space == tenant.space() && org == tenant.org() && !entry.value().deleted
            })
            .map(|entry| entry.value().clone())
            .collect();
        live.sort_by(|a, b| a.creation_date.cmp(&b.creation_date).then_with(|| a.id.cmp(&b.id)));
        live
    }
}

#[async_trait]
impl MetadataService for InMemoryMetadataService {
    async fn create(&self, ctx: &RequestContext, secret: &Secret) -> Result<Secret> {
        if secret.id.is_empty() {
            return Err(KeywardError::validation_field("Secret id required", "id"));
        }

        let mut stored = secret.clone();
        stored.payload = None;
        stored.creation_date.get_or_insert_with(Utc::now);

        let record_key = key(ctx.tenant(), &secret.id);
        if self.records.contains_key(&record_key) {
            return Err(KeywardError::conflict(
                format!("Secret '{}' already exists", secret.id),
                "Secret",
            ));
        }
        self.records.insert(record_key, stored.clone());

        Ok(stored)
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Option<Secret>> {
        Ok(self.records.get(&key(ctx.tenant(), id)).map(|entry| entry.value().clone()))
    }

    async fn update_state(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: StateUpdate,
    ) -> Result<()> {
        let mut record = self
            .records
            .get_mut(&key(ctx.tenant(), id))
            .ok_or_else(|| KeywardError::not_found("Secret", id))?;
        record.set_state(update.state, update.nonactive_reason);
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Secret> {
        let mut record = self
            .records
            .get_mut(&key(ctx.tenant(), id))
            .ok_or_else(|| KeywardError::not_found("Secret", id))?;
        record.deleted = true;
        record.state = KeyState::Destroyed;
        Ok(record.clone())
    }

    async fn list(&self, ctx: &RequestContext, params: &ListParams) -> Result<Vec<Secret>> {
        Ok(self
            .live_sorted(ctx.tenant())
            .into_iter()
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .collect())
    }

    async fn total(&self, ctx: &RequestContext, _params: &ListParams) -> Result<u64> {
        Ok(self.live_sorted(ctx.tenant()).len() as u64)
    }
}
