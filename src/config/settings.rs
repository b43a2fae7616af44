//! # Configuration Settings
//!
//! Defines the configuration structure for the secret lifecycle engine.

use crate::errors::{KeywardError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Key-material backend configuration
    #[validate(nested)]
    pub keystore: KeystoreConfig,

    /// Translation store configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Metadata service client configuration
    #[validate(nested)]
    pub metadata: MetadataServiceConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(KeywardError::from)?;

        self.validate_custom()?;

        Ok(())
    }

    /// Cross-field rules the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        if self.keystore.backend == KeystoreBackendKind::Barbican {
            if !self.keystore.url.starts_with("http://") && !self.keystore.url.starts_with("https://")
            {
                return Err(KeywardError::validation(
                    "Keystore URL must start with 'http://' or 'https://'",
                ));
            }

            if self.keystore.is_https() && self.keystore.ca_cert_path.is_none() {
                return Err(KeywardError::validation(
                    "An HTTPS keystore URL requires keystore.ca_cert_path",
                ));
            }
        }

        if self.database.store == TranslationStoreKind::Sql && !self.database.is_sqlite() {
            return Err(KeywardError::validation("Database URL must start with 'sqlite:'"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(KeywardError::validation(
                "min_connections cannot be greater than max_connections",
            ));
        }

        Ok(())
    }
}

/// Which key-material backend variant to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeystoreBackendKind {
    /// Networked Barbican-style secret/order API
    Barbican,
    /// In-memory double, for local development and tests
    Memory,
}

/// Key-material backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct KeystoreConfig {
    /// Backend variant, fixed for the lifetime of the process
    pub backend: KeystoreBackendKind,

    /// Base URL of the Barbican endpoint
    #[validate(length(min = 1, message = "Keystore URL cannot be empty"))]
    pub url: String,

    /// Transport timeout applied to every backend request, in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Request timeout must be between 1 and 300 seconds"
    ))]
    pub request_timeout_seconds: u64,

    /// PEM bundle trusted for HTTPS endpoints
    pub ca_cert_path: Option<String>,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            backend: KeystoreBackendKind::Barbican,
            url: "http://localhost:9311".to_string(),
            request_timeout_seconds: 60,
            ca_cert_path: None,
        }
    }
}

impl KeystoreConfig {
    /// Get the request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Whether the endpoint is served over TLS
    pub fn is_https(&self) -> bool {
        self.url.to_lowercase().starts_with("https")
    }
}

/// Storage mapping used for identifier translation.
///
/// The two mappings keep different update/delete semantics; see
/// [`crate::storage::IdTranslationStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStoreKind {
    /// Relational mapping: strict update, soft-delete tombstones
    Sql,
    /// Key-value mapping: idempotent overwrite, hard delete
    Memory,
}

/// Translation store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Storage mapping
    pub store: TranslationStoreKind,

    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(
        min = 1,
        max = 100,
        message = "Max connections must be between 1 and 100"
    ))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Create the translation table on first connect
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            store: TranslationStoreKind::Sql,
            url: "sqlite://./data/keyward.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }
}

/// Metadata service client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MetadataServiceConfig {
    /// Base URL of the metadata service
    #[validate(length(min = 1, message = "Metadata service URL cannot be empty"))]
    pub url: String,

    /// Per-request timeout in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Metadata timeout must be between 1 and 300 seconds"
    ))]
    pub timeout_seconds: u64,
}

impl Default for MetadataServiceConfig {
    fn default() -> Self {
        Self { url: "http://localhost:8090".to_string(), timeout_seconds: 30 }
    }
}

impl MetadataServiceConfig {
    /// Get the request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "keyward".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_keystore_config_timeout() {
        let config = KeystoreConfig { request_timeout_seconds: 45, ..Default::default() };
        assert_eq!(config.request_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_database_config_timeouts() {
        let config = DatabaseConfig {
            connect_timeout_seconds: 15,
            idle_timeout_seconds: 300,
            ..Default::default()
        };
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));

        let config_no_idle = DatabaseConfig { idle_timeout_seconds: 0, ..Default::default() };
        assert_eq!(config_no_idle.idle_timeout(), None);
    }

    #[test]
    fn test_https_keystore_requires_ca_bundle() {
        let mut config = AppConfig::default();
        config.keystore.url = "https://barbican.internal:9311".to_string();
        assert!(config.validate().is_err());

        config.keystore.ca_cert_path = Some("/etc/keyward/ca.crt".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_backend_skips_url_checks() {
        let mut config = AppConfig::default();
        config.keystore.backend = KeystoreBackendKind::Memory;
        config.keystore.url = "unused".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_errors() {
        let mut config = AppConfig::default();
        config.database.url = "mysql://localhost/ids".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.store = TranslationStoreKind::Memory;
        config.database.url = "mysql://localhost/ids".to_string();
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        config.database.min_connections = 20;
        config.database.max_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.keystore.request_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.observability.log_level = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_kind_serialization() {
        let json = serde_json::to_string(&KeystoreBackendKind::Barbican).unwrap();
        assert_eq!(json, "\"barbican\"");
        let parsed: TranslationStoreKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(parsed, TranslationStoreKind::Memory);
    }
}
