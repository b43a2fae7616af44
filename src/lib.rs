//! # Keyward
//!
//! Secret lifecycle orchestration over a Barbican-style key-material backend.
//!
//! ## Architecture
//!
//! ```text
//! SecretService ──► KeyMaterialBackend ──► Barbican (secrets, orders)
//!      │                  │
//!      │                  └──► IdTranslationStore (issued id → backend refs)
//!      ├──► MetadataService (descriptive fields, cached state)
//!      └──► lifecycle::reconcile (cached state vs. backend observation)
//! ```
//!
//! Multi-step writes register compensations on a [`RollbackLedger`] and undo
//! them in reverse order when a later step fails.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use keyward::{AppConfig, CreateSecretRequest, RequestContext, Result, Secret, SecretService, TenantContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None)?;
//!     keyward::observability::init_observability(&config.observability)?;
//!
//!     let service = SecretService::from_config(&config).await?;
//!     let ctx = RequestContext::new(TenantContext::new("space", "org")?);
//!
//!     let created = service
//!         .create_secret(&ctx, CreateSecretRequest::new(Secret::new("db-password")))
//!         .await?;
//!     println!("{} is {}", created.id, created.state);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod domain;
pub mod errors;
pub mod keystore;
pub mod lifecycle;
pub mod metadata;
pub mod observability;
pub mod rollback;
pub mod services;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use domain::{KeyState, NonactiveReason, RequestContext, Secret, SecretString, TenantContext};
pub use errors::{KeywardError, Result};
pub use keystore::KeyMaterialBackend;
pub use metadata::MetadataService;
pub use rollback::RollbackLedger;
pub use services::{CreateSecretRequest, SecretService};
pub use storage::IdTranslationStore;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
