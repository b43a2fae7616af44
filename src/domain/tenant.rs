//! Tenant scope and per-request context.

use super::SecretString;
use crate::errors::{KeywardError, Result};
use std::fmt;

/// The (space, org) partition every translation-store and backend call is
/// scoped by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    space: String,
    org: String,
}

impl TenantContext {
    /// Build a tenant scope, rejecting missing values as a bad request
    pub fn new(space: impl Into<String>, org: impl Into<String>) -> Result<Self> {
        let space = space.into();
        let org = org.into();

        if space.trim().is_empty() {
            return Err(KeywardError::validation_field("Header Bluemix-Space required", "space"));
        }
        if org.trim().is_empty() {
            return Err(KeywardError::validation_field("Header Bluemix-Org required", "org"));
        }

        Ok(Self { space, org })
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn org(&self) -> &str {
        &self.org
    }
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.space)
    }
}

/// Everything a single request carries into the engine besides its body.
#[derive(Debug, Clone)]
pub struct RequestContext {
    tenant: TenantContext,
    correlation_id: String,
    authorization: Option<SecretString>,
}

impl RequestContext {
    /// New context with a freshly generated correlation id
    pub fn new(tenant: TenantContext) -> Self {
        Self { tenant, correlation_id: uuid::Uuid::new_v4().to_string(), authorization: None }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Attach the caller's bearer credential, forwarded to the backend
    pub fn with_authorization(mut self, authorization: impl Into<SecretString>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn authorization(&self) -> Option<&SecretString> {
        self.authorization.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_requires_space_and_org() {
        let err = TenantContext::new("", "org").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("Bluemix-Space"));

        let err = TenantContext::new("space", "  ").unwrap_err();
        assert!(err.to_string().contains("Bluemix-Org"));

        let tenant = TenantContext::new("space", "org").unwrap();
        assert_eq!(tenant.to_string(), "org/space");
    }

    #[test]
    fn test_request_context_builders() {
        let ctx = RequestContext::new(TenantContext::new("s", "o").unwrap())
            .with_correlation_id("corr-1")
            .with_authorization("Bearer abc");
        assert_eq!(ctx.correlation_id(), "corr-1");
        assert_eq!(ctx.authorization().map(|a| a.expose_secret()), Some("Bearer abc"));
        assert!(!format!("{:?}", ctx).contains("Bearer abc"));
    }
}
