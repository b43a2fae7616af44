//! Common test utilities for all integration tests.
//!
//! Provides a file-backed translation database, a mocked Barbican endpoint,
//! and a fully wired [`SecretService`] over both.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod barbican;
pub mod test_db;

use keyward::config::KeystoreConfig;
use keyward::keystore::{BarbicanKeystore, HttpBarbicanClient};
use keyward::metadata::InMemoryMetadataService;
use keyward::storage::SqlTranslationStore;
use keyward::{RequestContext, SecretService, TenantContext};
use std::sync::Arc;
use wiremock::MockServer;

pub use barbican::MockBarbican;
pub use test_db::TestDatabase;

pub const SPACE: &str = "space-integration";
pub const ORG: &str = "org-integration";

pub fn ctx() -> RequestContext {
    RequestContext::new(TenantContext::new(SPACE, ORG).unwrap())
        .with_correlation_id("corr-integration")
        .with_authorization("Bearer integration-token")
}

/// Everything a lifecycle test touches
pub struct Harness {
    pub barbican: MockBarbican,
    pub db: TestDatabase,
    pub store: Arc<SqlTranslationStore>,
    pub keystore: Arc<BarbicanKeystore>,
    pub metadata: Arc<InMemoryMetadataService>,
    pub service: SecretService,
}

impl Harness {
    pub async fn new(prefix: &str) -> Self {
        let server = MockServer::start().await;
        let db = TestDatabase::new(prefix).await;

        let config = KeystoreConfig { url: server.uri(), ..Default::default() };
        let client = HttpBarbicanClient::new(&config).unwrap();
        let store = Arc::new(SqlTranslationStore::new(db.pool.clone()));
        let keystore = Arc::new(BarbicanKeystore::new(Arc::new(client), store.clone()));
        let metadata = Arc::new(InMemoryMetadataService::new());
        let service = SecretService::new(keystore.clone(), metadata.clone());

        Self { barbican: MockBarbican::new(server), db, store, keystore, metadata, service }
    }
}
