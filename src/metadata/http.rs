//! REST client for the metadata service.
//!
//! | operation      | request                                   | success |
//! |----------------|-------------------------------------------|---------|
//! | create         | `POST   /api/v1/secrets`                  | 201     |
//! | get            | `GET    /api/v1/secrets/{id}`             | 200/404 |
//! | update_state   | `PATCH  /api/v1/secrets/{id}`             | 200/204 |
//! | delete         | `DELETE /api/v1/secrets/{id}`             | 200     |
//! | list           | `GET    /api/v1/secrets?limit=&offset=`   | 200     |
//! | total          | `GET    /api/v1/secrets/total`            | 200     |

use super::{ListParams, MetadataService, StateUpdate};
use crate::config::MetadataServiceConfig;
use crate::domain::{RequestContext, Secret};
use crate::errors::{KeywardError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::instrument;

const SECRETS_PATH: &str = "/api/v1/secrets";

pub const BLUEMIX_SPACE_HEADER: &str = "Bluemix-Space";
pub const BLUEMIX_ORG_HEADER: &str = "Bluemix-Org";
pub const CORRELATION_ID_HEADER: &str = "Correlation-Id";

#[derive(Deserialize)]
struct SecretsPage {
    #[serde(default)]
    secrets: Vec<Secret>,
}

#[derive(Deserialize)]
struct TotalResponse {
    total: u64,
}

/// reqwest-backed [`MetadataService`].
#[derive(Debug, Clone)]
pub struct HttpMetadataClient {
    client: Client,
    base_url: String,
}

impl HttpMetadataClient {
    pub fn new(config: &MetadataServiceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build().map_err(|e| {
            KeywardError::config_with_source("Failed to create metadata HTTP client", Box::new(e))
        })?;

        Ok(Self { client, base_url: config.url.trim_end_matches('/').to_string() })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}{}", self.base_url, SECRETS_PATH, suffix)
    }

    fn scoped(&self, request: RequestBuilder, ctx: &RequestContext) -> RequestBuilder {
        let request = request
            .header(BLUEMIX_SPACE_HEADER, ctx.tenant().space())
            .header(BLUEMIX_ORG_HEADER, ctx.tenant().org())
            .header(CORRELATION_ID_HEADER, ctx.correlation_id());

        match ctx.authorization() {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, token.expose_secret()),
            None => request,
        }
    }

    async fn ensure_success(response: Response, id: Option<&str>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(KeywardError::not_found("Secret", id));
            }
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("Unexpected response").to_string()
        } else {
            body
        };
        Err(KeywardError::metadata(message, Some(status.as_u16())))
    }
}

#[async_trait]
impl MetadataService for HttpMetadataClient {
    #[instrument(skip_all, fields(correlation_id = %ctx.correlation_id(), secret_id = %secret.id))]
    async fn create(&self, ctx: &RequestContext, secret: &Secret) -> Result<Secret> {
        let response = self.scoped(self.client.post(self.url("")), ctx).json(secret).send().await?;
        let response = Self::ensure_success(response, None).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Option<Secret>> {
        let url = self.url(&format!("/{}", id));
        let response = self.scoped(self.client.get(url), ctx).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::ensure_success(response, Some(id)).await?;
        Ok(Some(response.json().await?))
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn update_state(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: StateUpdate,
    ) -> Result<()> {
        let url = self.url(&format!("/{}", id));
        let response = self.scoped(self.client.patch(url), ctx).json(&update).send().await?;
        Self::ensure_success(response, Some(id)).await?;
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Secret> {
        let url = self.url(&format!("/{}", id));
        let response = self.scoped(self.client.delete(url), ctx).send().await?;
        let response = Self::ensure_success(response, Some(id)).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn list(&self, ctx: &RequestContext, params: &ListParams) -> Result<Vec<Secret>> {
        let response =
            self.scoped(self.client.get(self.url("")), ctx).query(params).send().await?;
        let response = Self::ensure_success(response, None).await?;
        let page: SecretsPage = response.json().await?;
        Ok(page.secrets)
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn total(&self, ctx: &RequestContext, params: &ListParams) -> Result<u64> {
        let response =
            self.scoped(self.client.get(self.url("/total")), ctx).query(params).send().await?;
        let response = Self::ensure_success(response, None).await?;
        let total: TotalResponse = response.json().await?;
        Ok(total.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KeyState, NonactiveReason, TenantContext};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> RequestContext {
        RequestContext::new(TenantContext::new("space-1", "org-1").unwrap())
            .with_correlation_id("corr-9")
    }

    fn client_for(server: &MockServer) -> HttpMetadataClient {
        let config = MetadataServiceConfig { url: server.uri(), ..Default::default() };
        HttpMetadataClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_create_never_sends_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/secrets"))
            .and(header("Bluemix-Org", "org-1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "abc",
                "name": "db-password",
                "state": "activation"
            })))
            .mount(&server)
            .await;

        let mut secret = Secret::new("db-password").with_payload("hunter2");
        secret.id = "abc".to_string();
        let stored = client_for(&server).create(&ctx(), &secret).await.unwrap();
        assert_eq!(stored.state, KeyState::Activation);

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(!body.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/secrets/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client_for(&server).get(&ctx(), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_state_sends_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/secrets/abc"))
            .and(body_json(json!({"state": "deactivated", "nonactive_reason": "expired"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let update =
            StateUpdate { state: KeyState::Deactivated, nonactive_reason: Some(NonactiveReason::Expired) };
        client_for(&server).update_state(&ctx(), "abc", update).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/secrets"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secrets": [{"id": "a", "name": "first"}, {"id": "b", "name": "second"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/secrets/total"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 2})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let params = ListParams { limit: 10, offset: 0 };
        let page = client.list(&ctx(), &params).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].state, KeyState::Preactivation);
        assert_eq!(client.total(&ctx(), &params).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_metadata_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/secrets/abc"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server).delete(&ctx(), "abc").await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 502);
    }
}
