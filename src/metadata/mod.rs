//! # Metadata Service
//!
//! Client side of the external catalog that owns a secret's descriptive
//! fields and cached lifecycle state. The engine never sends payloads here;
//! [`crate::domain::Secret`] skips them during serialization.

pub mod http;
pub mod memory;

pub use http::HttpMetadataClient;
pub use memory::InMemoryMetadataService;

use crate::domain::{KeyState, NonactiveReason, RequestContext, Secret};
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_LIMIT: u32 = 200;
pub const MAX_PAGE_LIMIT: u32 = 5000;

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

/// Paging parameters for list and total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 5000, message = "limit must be between 1 and 5000"))]
    pub limit: u32,

    #[serde(default)]
    pub offset: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self { limit: DEFAULT_PAGE_LIMIT, offset: 0 }
    }
}

/// Lifecycle fields the engine may change on an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub state: KeyState,
    pub nonactive_reason: Option<NonactiveReason>,
}

/// Operations the engine needs from the metadata service.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Persist a new record; `secret.id` is already assigned.
    async fn create(&self, ctx: &RequestContext, secret: &Secret) -> Result<Secret>;

    /// Fetch a record, including soft-deleted ones. `None` if unknown.
    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Option<Secret>>;

    async fn update_state(&self, ctx: &RequestContext, id: &str, update: StateUpdate)
        -> Result<()>;

    /// Mark a record deleted and its material destroyed, returning the record.
    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Secret>;

    /// One page of live records for the tenant
    async fn list(&self, ctx: &RequestContext, params: &ListParams) -> Result<Vec<Secret>>;

    /// Number of live records for the tenant
    async fn total(&self, ctx: &RequestContext, params: &ListParams) -> Result<u64>;
}
