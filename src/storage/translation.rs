//! # ID Translation Store
//!
//! Tenant-scoped mapping from an issued secret identifier to the backend
//! secret and order references behind it.
//!
//! Two mappings exist with deliberately different write semantics:
//!
//! | operation | [`SqlTranslationStore`]         | [`MemoryTranslationStore`] |
//! |-----------|---------------------------------|----------------------------|
//! | `update`  | zero affected rows is an error  | idempotent overwrite       |
//! | `delete`  | soft tombstone (`deleted = 1`)  | row removed                |

use crate::db_span;
use crate::domain::{BackendRefs, TenantContext};
use crate::errors::{KeywardError, Result};
use crate::storage::pool::DbPool;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, instrument, Instrument};

const RESOURCE: &str = "Secret";

/// Persistent issued-id → backend-reference mapping.
#[async_trait]
pub trait IdTranslationStore: Send + Sync {
    /// Insert a new row. Requires an issued id and at least one reference.
    async fn add(&self, tenant: &TenantContext, refs: &BackendRefs) -> Result<()>;

    /// Look up a row. Missing rows and rows with no references are not-found.
    async fn get(&self, tenant: &TenantContext, issued_id: &str) -> Result<BackendRefs>;

    /// Replace the references of an existing row.
    async fn update(&self, tenant: &TenantContext, refs: &BackendRefs) -> Result<()>;

    /// Remove a row.
    async fn delete(&self, tenant: &TenantContext, issued_id: &str) -> Result<()>;
}

fn validate_refs(refs: &BackendRefs) -> Result<()> {
    if refs.issued_id.trim().is_empty() {
        return Err(KeywardError::validation_field("Issued identifier required", "issued_id"));
    }
    if refs.is_empty() {
        return Err(KeywardError::validation(
            "A secret reference or an order reference is required",
        ));
    }
    Ok(())
}

/// Create the translation table if it does not exist.
pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS secret_id_translations (
            issued_id   TEXT    NOT NULL,
            space_id    TEXT    NOT NULL,
            org_id      TEXT    NOT NULL,
            secret_ref  TEXT    NOT NULL DEFAULT '',
            order_ref   TEXT    NOT NULL DEFAULT '',
            deleted     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (space_id, org_id, issued_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| KeywardError::Database {
        source: e,
        context: "Failed to create secret_id_translations table".to_string(),
    })?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct TranslationRow {
    secret_ref: String,
    order_ref: String,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Relational mapping over the shared SQLite pool.
#[derive(Debug, Clone)]
pub struct SqlTranslationStore {
    pool: DbPool,
}

impl SqlTranslationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl IdTranslationStore for SqlTranslationStore {
    #[instrument(skip(self, refs), fields(space = %tenant.space(), issued_id = %refs.issued_id))]
    async fn add(&self, tenant: &TenantContext, refs: &BackendRefs) -> Result<()> {
        validate_refs(refs)?;

        // A tombstoned row under the same key is revived; a live one is a conflict
        let result = sqlx::query(
            r#"
            INSERT INTO secret_id_translations (issued_id, space_id, org_id, secret_ref, order_ref, deleted)
            VALUES (?, ?, ?, ?, ?, 0)
            ON CONFLICT (space_id, org_id, issued_id) DO UPDATE
                SET secret_ref = excluded.secret_ref,
                    order_ref = excluded.order_ref,
                    deleted = 0
                WHERE secret_id_translations.deleted = 1
            "#,
        )
        .bind(&refs.issued_id)
        .bind(tenant.space())
        .bind(tenant.org())
        .bind(refs.secret_ref().unwrap_or_default())
        .bind(refs.order_ref().unwrap_or_default())
        .execute(&self.pool)
        .instrument(db_span!("translation_add"))
        .await
        .map_err(|e| KeywardError::Database {
            source: e,
            context: format!("Failed to add translation for '{}'", refs.issued_id),
        })?;

        if result.rows_affected() == 0 {
            return Err(KeywardError::conflict(
                format!("Issued identifier '{}' already exists", refs.issued_id),
                RESOURCE,
            ));
        }

        debug!("Translation row added");
        Ok(())
    }

    #[instrument(skip(self), fields(space = %tenant.space()))]
    async fn get(&self, tenant: &TenantContext, issued_id: &str) -> Result<BackendRefs> {
        let row = sqlx::query_as::<_, TranslationRow>(
            r#"
            SELECT secret_ref, order_ref
            FROM secret_id_translations
            WHERE space_id = ? AND org_id = ? AND issued_id = ? AND deleted = 0
            "#,
        )
        .bind(tenant.space())
        .bind(tenant.org())
        .bind(issued_id)
        .fetch_optional(&self.pool)
        .instrument(db_span!("translation_get"))
        .await
        .map_err(|e| KeywardError::Database {
            source: e,
            context: format!("Failed to get translation for '{}'", issued_id),
        })?;

        let refs = row
            .map(|row| BackendRefs {
                issued_id: issued_id.to_string(),
                secret_ref: non_empty(row.secret_ref),
                order_ref: non_empty(row.order_ref),
            })
            .filter(|refs| !refs.is_empty());

        refs.ok_or_else(|| KeywardError::not_found(RESOURCE, issued_id))
    }

    #[instrument(skip(self, refs), fields(space = %tenant.space(), issued_id = %refs.issued_id))]
    async fn update(&self, tenant: &TenantContext, refs: &BackendRefs) -> Result<()> {
        validate_refs(refs)?;

        let result = sqlx::query(
            r#"
            UPDATE secret_id_translations
            SET secret_ref = ?, order_ref = ?
            WHERE space_id = ? AND org_id = ? AND issued_id = ? AND deleted = 0
            "#,
        )
        .bind(refs.secret_ref().unwrap_or_default())
        .bind(refs.order_ref().unwrap_or_default())
        .bind(tenant.space())
        .bind(tenant.org())
        .bind(&refs.issued_id)
        .execute(&self.pool)
        .instrument(db_span!("translation_update"))
        .await
        .map_err(|e| KeywardError::Database {
            source: e,
            context: format!("Failed to update translation for '{}'", refs.issued_id),
        })?;

        if result.rows_affected() == 0 {
            return Err(KeywardError::not_found(RESOURCE, &refs.issued_id));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(space = %tenant.space()))]
    async fn delete(&self, tenant: &TenantContext, issued_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE secret_id_translations
            SET deleted = 1
            WHERE space_id = ? AND org_id = ? AND issued_id = ? AND deleted = 0
            "#,
        )
        .bind(tenant.space())
        .bind(tenant.org())
        .bind(issued_id)
        .execute(&self.pool)
        .instrument(db_span!("translation_delete"))
        .await
        .map_err(|e| KeywardError::Database {
            source: e,
            context: format!("Failed to delete translation for '{}'", issued_id),
        })?;

        if result.rows_affected() == 0 {
            debug!("No live translation row to tombstone");
        }

        Ok(())
    }
}

type TranslationKey = (String, String, String);

fn key(tenant: &TenantContext, issued_id: &str) -> TranslationKey {
    (tenant.space().to_string(), tenant.org().to_string(), issued_id.to_string())
}

/// Key-value mapping held in process memory.
#[derive(Debug, Default)]
pub struct MemoryTranslationStore {
    rows: DashMap<TranslationKey, BackendRefs>,
}

impl MemoryTranslationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl IdTranslationStore for MemoryTranslationStore {
    async fn add(&self, tenant: &TenantContext, refs: &BackendRefs) -> Result<()> {
        validate_refs(refs)?;

        match self.rows.entry(key(tenant, &refs.issued_id)) {
            Entry::Occupied(_) => Err(KeywardError::conflict(
                format!("Issued identifier '{}' already exists", refs.issued_id),
                RESOURCE,
            )),
            Entry::Vacant(slot) => {
                slot.insert(refs.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, tenant: &TenantContext, issued_id: &str) -> Result<BackendRefs> {
        self.rows
            .get(&key(tenant, issued_id))
            .map(|row| row.value().clone())
            .filter(|refs| !refs.is_empty())
            .ok_or_else(|| KeywardError::not_found(RESOURCE, issued_id))
    }

    async fn update(&self, tenant: &TenantContext, refs: &BackendRefs) -> Result<()> {
        validate_refs(refs)?;
        self.rows.insert(key(tenant, &refs.issued_id), refs.clone());
        Ok(())
    }

    async fn delete(&self, tenant: &TenantContext, issued_id: &str) -> Result<()> {
        self.rows.remove(&key(tenant, issued_id));
        Ok(())
    }
}

/// Allocate a collision-free issued id and insert `refs` under it.
///
/// Tokens from `generator` are checked with `get` until one is not found. Any
/// other lookup error aborts the allocation.
pub async fn allocate_id<G>(
    store: &dyn IdTranslationStore,
    tenant: &TenantContext,
    refs: BackendRefs,
    mut generator: G,
) -> Result<String>
where
    G: FnMut() -> String + Send,
{
    let issued_id = loop {
        let candidate = generator();
        match store.get(tenant, &candidate).await {
            Ok(_) => debug!(candidate = %candidate, "Issued identifier collision; retrying"),
            Err(e) if e.is_not_found() => break candidate,
            Err(e) => return Err(e),
        }
    };

    let refs = BackendRefs { issued_id: issued_id.clone(), ..refs };
    store.add(tenant, &refs).await?;

    Ok(issued_id)
}

/// [`allocate_id`] with random UUID v4 tokens.
pub async fn allocate_uuid(
    store: &dyn IdTranslationStore,
    tenant: &TenantContext,
    refs: BackendRefs,
) -> Result<String> {
    allocate_id(store, tenant, refs, || uuid::Uuid::new_v4().to_string()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::pool::create_pool;

    fn tenant() -> TenantContext {
        TenantContext::new("space-1", "org-1").unwrap()
    }

    async fn sql_store() -> SqlTranslationStore {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 0,
            idle_timeout_seconds: 0,
            ..Default::default()
        };
        SqlTranslationStore::new(create_pool(&config).await.unwrap())
    }

    fn refs(id: &str) -> BackendRefs {
        BackendRefs { issued_id: id.to_string(), ..BackendRefs::for_secret("sec-1") }
    }

    #[tokio::test]
    async fn test_sql_add_get_roundtrip() {
        let store = sql_store().await;
        store.add(&tenant(), &refs("id-1")).await.unwrap();

        let found = store.get(&tenant(), "id-1").await.unwrap();
        assert_eq!(found.secret_ref(), Some("sec-1"));
        assert_eq!(found.order_ref(), None);
    }

    #[tokio::test]
    async fn test_sql_rows_are_tenant_scoped() {
        let store = sql_store().await;
        store.add(&tenant(), &refs("id-1")).await.unwrap();

        let other = TenantContext::new("space-2", "org-1").unwrap();
        assert!(store.get(&other, "id-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_sql_add_rejects_duplicates_and_empty_refs() {
        let store = sql_store().await;
        store.add(&tenant(), &refs("id-1")).await.unwrap();

        let err = store.add(&tenant(), &refs("id-1")).await.unwrap_err();
        assert!(err.is_conflict());

        let empty = BackendRefs { issued_id: "id-2".to_string(), ..Default::default() };
        assert_eq!(store.add(&tenant(), &empty).await.unwrap_err().status_code(), 400);

        let no_id = BackendRefs::for_order("ord-1");
        assert_eq!(store.add(&tenant(), &no_id).await.unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn test_sql_update_is_strict() {
        let store = sql_store().await;
        let err = store.update(&tenant(), &refs("missing")).await.unwrap_err();
        assert!(err.is_not_found());

        let pending = BackendRefs { issued_id: "id-1".to_string(), ..BackendRefs::for_order("ord-1") };
        store.add(&tenant(), &pending).await.unwrap();

        let promoted = BackendRefs { secret_ref: Some("sec-9".to_string()), ..pending };
        store.update(&tenant(), &promoted).await.unwrap();

        let found = store.get(&tenant(), "id-1").await.unwrap();
        assert_eq!(found.secret_ref(), Some("sec-9"));
        assert_eq!(found.order_ref(), Some("ord-1"));
    }

    #[tokio::test]
    async fn test_sql_delete_tombstones() {
        let store = sql_store().await;
        store.add(&tenant(), &refs("id-1")).await.unwrap();
        store.delete(&tenant(), "id-1").await.unwrap();

        assert!(store.get(&tenant(), "id-1").await.unwrap_err().is_not_found());

        let deleted: i64 = sqlx::query_scalar(
            "SELECT deleted FROM secret_id_translations WHERE issued_id = 'id-1'",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(deleted, 1);

        // Strict update does not resurrect a tombstone
        assert!(store.update(&tenant(), &refs("id-1")).await.is_err());
        // A fresh add under the same key revives it
        store.add(&tenant(), &refs("id-1")).await.unwrap();
        assert!(store.get(&tenant(), "id-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_update_upserts_and_delete_removes() {
        let store = MemoryTranslationStore::new();
        store.update(&tenant(), &refs("id-1")).await.unwrap();
        assert_eq!(store.len(), 1);

        let err = store.add(&tenant(), &refs("id-1")).await.unwrap_err();
        assert!(err.is_conflict());

        store.delete(&tenant(), "id-1").await.unwrap();
        assert!(store.is_empty());
        store.delete(&tenant(), "id-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_allocate_skips_existing_ids() {
        let store = MemoryTranslationStore::new();
        store.add(&tenant(), &refs("taken-1")).await.unwrap();
        store.add(&tenant(), &refs("taken-2")).await.unwrap();

        let mut candidates = vec!["taken-1", "taken-2", "fresh"].into_iter();
        let id = allocate_id(&store, &tenant(), BackendRefs::for_order("ord-7"), || {
            candidates.next().unwrap_or("exhausted").to_string()
        })
        .await
        .unwrap();

        assert_eq!(id, "fresh");
        let found = store.get(&tenant(), "fresh").await.unwrap();
        assert_eq!(found.order_ref(), Some("ord-7"));
    }

    #[tokio::test]
    async fn test_allocate_uuid_yields_distinct_ids() {
        let store = sql_store().await;
        let first = allocate_uuid(&store, &tenant(), BackendRefs::for_secret("a")).await.unwrap();
        let second = allocate_uuid(&store, &tenant(), BackendRefs::for_secret("b")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.get(&tenant(), &first).await.unwrap().secret_ref(), Some("a"));
        assert_eq!(store.get(&tenant(), &second).await.unwrap().secret_ref(), Some("b"));
    }
}
