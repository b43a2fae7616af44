//! Test database utilities for integration tests.
//!
//! Each test gets its own file-based SQLite database inside a temporary
//! directory that is removed when the handle drops.

#![allow(clippy::duplicate_mod)]

use keyward::config::{DatabaseConfig, TranslationStoreKind};
use keyward::storage::{create_pool, DbPool};
use std::path::PathBuf;
use tempfile::TempDir;

/// A translation database that is deleted on drop.
pub struct TestDatabase {
    pub pool: DbPool,
    pub path: PathBuf,
    _dir: TempDir,
}

impl TestDatabase {
    /// Create a database with the translation schema applied.
    pub async fn new(prefix: &str) -> Self {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir().unwrap();
        let path = dir.path().join("translations.db");

        let config = DatabaseConfig {
            store: TranslationStoreKind::Sql,
            url: format!("sqlite://{}", path.display()),
            max_connections: 4,
            auto_migrate: true,
            ..Default::default()
        };
        let pool = create_pool(&config).await.unwrap();

        Self { pool, path, _dir: dir }
    }

    /// Number of rows, tombstoned or not, for an issued identifier
    pub async fn raw_row_count(&self, issued_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM secret_id_translations WHERE issued_id = ?")
            .bind(issued_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
