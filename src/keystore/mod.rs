//! # Key-Material Backend
//!
//! Abstraction over the system that actually holds key material. The
//! networked [`BarbicanKeystore`] resolves asynchronous generation orders and
//! retries transient failures; the [`MemoryKeystore`] double does neither.
//!
//! Both map issued identifiers onto backend references through an
//! [`IdTranslationStore`].

pub mod barbican;
pub mod memory;
pub mod retry;

pub use barbican::{BarbicanKeystore, HttpBarbicanClient};
pub use memory::MemoryKeystore;
pub use retry::{with_retries, MAX_RETRIES};

use crate::config::{KeystoreBackendKind, KeystoreConfig};
use crate::domain::{KeyState, RequestContext, Secret, SecretString};
use crate::errors::{KeywardError, Result};
use crate::rollback::RollbackLedger;
use crate::storage::IdTranslationStore;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_ALGORITHM: &str = "AES";
pub const DEFAULT_MODE: &str = "GCM";
pub const DEFAULT_BIT_LENGTH: u32 = 256;

pub const MODE_KEY: &str = "mode";
pub const BIT_LENGTH_KEY: &str = "bitLength";

/// Material and lifecycle state observed on read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadState {
    /// Absent unless the state is [`KeyState::Activation`]
    pub payload: Option<SecretString>,
    pub state: KeyState,
}

impl PayloadState {
    pub fn active(payload: SecretString) -> Self {
        Self { payload: Some(payload), state: KeyState::Activation }
    }

    pub fn without_payload(state: KeyState) -> Self {
        Self { payload: None, state }
    }
}

/// Generation parameters resolved from a secret's algorithm fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    pub algorithm: String,
    pub mode: String,
    pub bit_length: u32,
}

/// Fill in generation defaults on `secret` and return the resulting parameters.
///
/// Caller-supplied algorithm, mode and bit length are kept; missing ones get
/// AES, GCM and 256 and are written back so the metadata service records them.
pub fn apply_generation_defaults(secret: &mut Secret) -> Result<GenerationParams> {
    let algorithm = secret
        .algorithm_type
        .get_or_insert_with(|| DEFAULT_ALGORITHM.to_string())
        .clone();
    let mode = secret
        .algorithm_metadata
        .entry(MODE_KEY.to_string())
        .or_insert_with(|| DEFAULT_MODE.to_string())
        .clone();
    let bit_length = secret
        .algorithm_metadata
        .entry(BIT_LENGTH_KEY.to_string())
        .or_insert_with(|| DEFAULT_BIT_LENGTH.to_string())
        .parse::<u32>()
        .map_err(|_| KeywardError::validation_field("bitLength must be a positive integer", "bitLength"))?;

    Ok(GenerationParams { algorithm, mode, bit_length })
}

/// Capability set every key-material backend provides.
#[async_trait]
pub trait KeyMaterialBackend: Send + Sync {
    /// Store supplied material or start generation, returning the issued id.
    ///
    /// Sets `secret.state` to `Activation` for supplied material and
    /// `Preactivation` for generation. Compensations for every durable step
    /// are registered on `ledger`.
    async fn create_secret(
        &self,
        ctx: &RequestContext,
        secret: &mut Secret,
        ledger: &mut RollbackLedger,
    ) -> Result<String>;

    /// Destroy the material behind `id` and forget the id.
    ///
    /// Fails with a conflict while generation is still pending.
    async fn delete_secret(
        &self,
        ctx: &RequestContext,
        id: &str,
        ledger: &mut RollbackLedger,
    ) -> Result<()>;

    /// Fetch material, resolving a pending order first if needed.
    async fn get_payload(&self, ctx: &RequestContext, id: &str) -> Result<PayloadState>;

    /// Current backend state without fetching material.
    async fn check_secret(&self, ctx: &RequestContext, id: &str) -> Result<KeyState>;
}

/// Construct the configured backend variant over `store`.
pub fn build_backend(
    config: &KeystoreConfig,
    store: Arc<dyn IdTranslationStore>,
) -> Result<Arc<dyn KeyMaterialBackend>> {
    match config.backend {
        KeystoreBackendKind::Barbican => {
            let client = HttpBarbicanClient::new(config)?;
            Ok(Arc::new(BarbicanKeystore::new(Arc::new(client), store)))
        }
        KeystoreBackendKind::Memory => Ok(Arc::new(MemoryKeystore::new(store))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTranslationStore;

    #[test]
    fn test_generation_defaults_fill_missing_fields() {
        let mut secret = Secret::new("generated");
        let params = apply_generation_defaults(&mut secret).unwrap();

        assert_eq!(
            params,
            GenerationParams { algorithm: "AES".to_string(), mode: "GCM".to_string(), bit_length: 256 }
        );
        assert_eq!(secret.algorithm_type.as_deref(), Some("AES"));
        assert_eq!(secret.algorithm_metadata.get("mode").map(String::as_str), Some("GCM"));
        assert_eq!(secret.algorithm_metadata.get("bitLength").map(String::as_str), Some("256"));
    }

    #[test]
    fn test_generation_defaults_keep_overrides() {
        let mut secret = Secret::new("generated");
        secret.algorithm_metadata.insert("bitLength".to_string(), "128".to_string());
        secret.algorithm_metadata.insert("mode".to_string(), "CBC".to_string());

        let params = apply_generation_defaults(&mut secret).unwrap();
        assert_eq!(params.bit_length, 128);
        assert_eq!(params.mode, "CBC");

        secret.algorithm_metadata.insert("bitLength".to_string(), "lots".to_string());
        assert!(apply_generation_defaults(&mut secret).is_err());
    }

    #[test]
    fn test_build_backend_variants() {
        let store: Arc<dyn IdTranslationStore> = Arc::new(MemoryTranslationStore::new());

        let memory = KeystoreConfig { backend: KeystoreBackendKind::Memory, ..Default::default() };
        assert!(build_backend(&memory, store.clone()).is_ok());

        let insecure = KeystoreConfig {
            backend: KeystoreBackendKind::Barbican,
            url: "https://barbican:9311".to_string(),
            ca_cert_path: None,
            ..Default::default()
        };
        assert!(build_backend(&insecure, store).is_err());
    }
}
