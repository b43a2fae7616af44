//! # Configuration Management
//!
//! Layered configuration for the secret lifecycle engine: built-in defaults,
//! an optional configuration file, then `KEYWARD__*` environment variables
//! (for example `KEYWARD__KEYSTORE__URL`).

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, KeystoreBackendKind, KeystoreConfig, MetadataServiceConfig,
    ObservabilityConfig, TranslationStoreKind,
};

use crate::errors::Result;
use std::path::Path;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "KEYWARD";

impl AppConfig {
    /// Load configuration from defaults, an optional file, and the environment.
    ///
    /// A `.env` file in the working directory is honoured when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        tracing::debug!(
            keystore_backend = ?config.keystore.backend,
            translation_store = ?config.database.store,
            "Configuration loaded"
        );

        Ok(config)
    }
}
