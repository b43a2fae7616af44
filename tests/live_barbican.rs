//! Tests against a live Barbican endpoint.
//!
//! ```bash
//! KEYWARD__KEYSTORE__URL=http://barbican:9311 \
//!     cargo test --features integration-tests --test live_barbican
//! ```

#![cfg(feature = "integration-tests")]

use keyward::config::{AppConfig, KeystoreBackendKind, TranslationStoreKind};
use keyward::keystore::build_backend;
use keyward::storage::build_translation_store;
use keyward::{KeyState, RequestContext, RollbackLedger, Secret, TenantContext};

#[tokio::test]
async fn test_supplied_secret_round_trip() {
    let mut config = AppConfig::load(None).unwrap();
    config.keystore.backend = KeystoreBackendKind::Barbican;
    config.database.store = TranslationStoreKind::Memory;

    let store = build_translation_store(&config.database).await.unwrap();
    let backend = build_backend(&config.keystore, store).unwrap();
    let ctx = RequestContext::new(TenantContext::new("keyward-live", "keyward-live").unwrap());

    let mut secret = Secret::new("keyward-live-check").with_payload("live-material");
    let mut ledger = RollbackLedger::new();
    let id = backend.create_secret(&ctx, &mut secret, &mut ledger).await.unwrap();
    ledger.complete();

    assert_eq!(backend.check_secret(&ctx, &id).await.unwrap(), KeyState::Activation);
    let observed = backend.get_payload(&ctx, &id).await.unwrap();
    assert_eq!(observed.payload.unwrap().expose_secret(), "live-material");

    let mut ledger = RollbackLedger::new();
    backend.delete_secret(&ctx, &id, &mut ledger).await.unwrap();
    ledger.complete();
}
