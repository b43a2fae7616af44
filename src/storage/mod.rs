//! # Storage and Persistence
//!
//! The identifier translation store and the SQLite pool behind its
//! relational mapping.

pub mod pool;
pub mod translation;

pub use crate::config::{DatabaseConfig, TranslationStoreKind};

pub use pool::{create_pool, shared_pool, DbPool};
pub use translation::{
    allocate_id, allocate_uuid, ensure_schema, IdTranslationStore, MemoryTranslationStore,
    SqlTranslationStore,
};

use crate::errors::{KeywardError, Result};
use std::sync::Arc;

/// Construct the configured translation mapping.
///
/// The relational mapping shares the process-wide pool.
pub async fn build_translation_store(config: &DatabaseConfig) -> Result<Arc<dyn IdTranslationStore>> {
    match config.store {
        TranslationStoreKind::Sql => {
            let pool = shared_pool(config).await?;
            Ok(Arc::new(SqlTranslationStore::new(pool)))
        }
        TranslationStoreKind::Memory => Ok(Arc::new(MemoryTranslationStore::new())),
    }
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| KeywardError::Database {
        source: e,
        context: "Database connectivity check failed".to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_connection() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            auto_migrate: false,
            ..Default::default()
        };

        let pool = create_pool(&config).await.unwrap();
        check_connection(&pool).await.unwrap();

        pool.close().await;
        assert!(check_connection(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_build_memory_store() {
        let config = DatabaseConfig { store: TranslationStoreKind::Memory, ..Default::default() };
        let store = build_translation_store(&config).await.unwrap();

        let tenant = crate::domain::TenantContext::new("s", "o").unwrap();
        assert!(store.get(&tenant, "nope").await.unwrap_err().is_not_found());
    }
}
