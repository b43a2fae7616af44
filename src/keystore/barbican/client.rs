//! HTTP client for the Barbican secret and order API.
//!
//! Every request carries the caller's `Authorization` header, the tenant's
//! `Bluemix-Space`, and the correlation id as `X-Openstack-Request-Id`.
//! Barbican returns full URIs for new resources; only the last path segment
//! is kept as the reference.

use crate::config::KeystoreConfig;
use crate::domain::{RequestContext, SecretString};
use crate::errors::{KeywardError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

pub const SECRETS_PATH: &str = "/v1/secrets";
pub const ORDERS_PATH: &str = "/v1/orders";
pub const PAYLOAD_PATH: &str = "/payload";

pub const BLUEMIX_SPACE_HEADER: &str = "Bluemix-Space";
pub const REQUEST_ID_HEADER: &str = "X-Openstack-Request-Id";

/// Content types Barbican will return a payload in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadContentType {
    /// Raw bytes; base64-encoded on receipt
    OctetStream,
    TextPlain,
}

impl PayloadContentType {
    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::OctetStream => "application/octet-stream",
            Self::TextPlain => "text/plain",
        }
    }
}

impl FromStr for PayloadContentType {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "application/octet-stream" => Ok(Self::OctetStream),
            "text/plain" => Ok(Self::TextPlain),
            other => Err(KeywardError::validation_field(
                format!("Invalid accept header given: {}", other),
                "accept",
            )),
        }
    }
}

impl fmt::Display for PayloadContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Store caller-supplied material
#[derive(Debug, Clone)]
pub struct PostSecretRequest {
    pub name: String,
    pub payload: SecretString,
    pub content_type: PayloadContentType,
}

#[derive(Serialize)]
struct PostSecretBody<'a> {
    name: &'a str,
    payload: &'a str,
    payload_content_type: &'a str,
}

#[derive(Deserialize)]
struct PostSecretResponse {
    secret_ref: String,
}

/// Order parameters for backend key generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderMeta {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub algorithm: String,
    pub bit_length: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mode: String,
    pub payload_content_type: String,
}

/// Request the backend to generate a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostOrderRequest {
    #[serde(rename = "type")]
    pub order_type: String,
    pub meta: OrderMeta,
}

impl PostOrderRequest {
    pub fn key(meta: OrderMeta) -> Self {
        Self { order_type: "key".to_string(), meta }
    }
}

#[derive(Deserialize)]
struct PostOrderResponse {
    order_ref: String,
}

#[derive(Deserialize)]
struct CheckOrderResponse {
    #[serde(default)]
    secret_ref: Option<String>,
    status: String,
    #[serde(default)]
    error_reason: Option<String>,
}

/// Progress of an asynchronous generation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    /// Material generated and addressable by `secret_ref`
    Active { secret_ref: String },
    /// Generation failed; the order will never produce material
    Error { reason: Option<String> },
}

/// Barbican standard error body
#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

/// Error body produced by the authentication middleware in front of Barbican
#[derive(Deserialize)]
struct MiddlewareError {
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
}

/// Turn a non-success response body into a backend error.
pub(crate) fn decode_error(status: StatusCode, body: &[u8]) -> KeywardError {
    let code = Some(status.as_u16());

    if let Ok(standard) = serde_json::from_slice::<ErrorResponse>(body) {
        if !standard.description.is_empty() {
            return KeywardError::backend(
                format!("{}: {}", standard.title, standard.description),
                code,
            );
        }
    }

    if let Ok(middleware) = serde_json::from_slice::<MiddlewareError>(body) {
        if !middleware.message.is_empty() || !middleware.title.is_empty() {
            let message =
                middleware.message.trim().replace("<br />", "").replace("<br>", "");
            return KeywardError::backend(format!("{}: {}", middleware.title, message), code);
        }
    }

    KeywardError::backend("Something went wrong.: Internal Server Error", code)
}

/// Last path segment of a Barbican resource URI
pub fn parse_ref(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Operations against the Barbican REST API.
#[async_trait]
pub trait BarbicanApi: Send + Sync {
    /// Store supplied material; returns the secret reference
    async fn post_secret(&self, ctx: &RequestContext, request: &PostSecretRequest)
        -> Result<String>;

    /// Start key generation; returns the order reference
    async fn post_order(&self, ctx: &RequestContext, request: &PostOrderRequest) -> Result<String>;

    async fn check_order(&self, ctx: &RequestContext, order_ref: &str) -> Result<OrderStatus>;

    async fn get_payload(
        &self,
        ctx: &RequestContext,
        secret_ref: &str,
        accept: PayloadContentType,
    ) -> Result<SecretString>;

    async fn delete_secret(&self, ctx: &RequestContext, secret_ref: &str) -> Result<()>;

    async fn delete_order(&self, ctx: &RequestContext, order_ref: &str) -> Result<()>;
}

/// reqwest-backed [`BarbicanApi`].
#[derive(Debug, Clone)]
pub struct HttpBarbicanClient {
    client: Client,
    base_url: String,
}

impl HttpBarbicanClient {
    /// Build a client for the configured endpoint.
    ///
    /// HTTPS endpoints must have a CA bundle configured.
    pub fn new(config: &KeystoreConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.request_timeout());

        if config.is_https() {
            let path = config.ca_cert_path.as_deref().ok_or_else(|| {
                KeywardError::config("HTTPS is not configured: keystore.ca_cert_path is required")
            })?;
            let pem = std::fs::read(path).map_err(|e| {
                KeywardError::config_with_source(
                    format!("Failed to read CA bundle at {}", path),
                    Box::new(e),
                )
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                KeywardError::config_with_source(
                    format!("Invalid CA bundle at {}", path),
                    Box::new(e),
                )
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder.build().map_err(|e| {
            KeywardError::config_with_source("Failed to create HTTP client", Box::new(e))
        })?;

        Ok(Self { client, base_url: config.url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_headers(&self, request: RequestBuilder, ctx: &RequestContext) -> RequestBuilder {
        let request = request
            .header(BLUEMIX_SPACE_HEADER, ctx.tenant().space())
            .header(REQUEST_ID_HEADER, ctx.correlation_id());

        match ctx.authorization() {
            Some(token) => request.header(header::AUTHORIZATION, token.expose_secret()),
            None => request,
        }
    }

    async fn error_from(response: Response) -> KeywardError {
        let status = response.status();
        match response.bytes().await {
            Ok(body) => decode_error(status, &body),
            Err(e) => KeywardError::from(e),
        }
    }
}

#[async_trait]
impl BarbicanApi for HttpBarbicanClient {
    #[instrument(skip(self, ctx, request), fields(correlation_id = %ctx.correlation_id()))]
    async fn post_secret(
        &self,
        ctx: &RequestContext,
        request: &PostSecretRequest,
    ) -> Result<String> {
        let body = PostSecretBody {
            name: &request.name,
            payload: request.payload.expose_secret(),
            payload_content_type: request.content_type.as_mime(),
        };

        let response =
            self.with_headers(self.client.post(self.url(SECRETS_PATH)), ctx).json(&body).send().await?;

        if response.status() != StatusCode::CREATED {
            return Err(Self::error_from(response).await);
        }

        let created: PostSecretResponse = response.json().await?;
        debug!("Secret stored in backend");
        Ok(parse_ref(&created.secret_ref).to_string())
    }

    #[instrument(skip(self, ctx, request), fields(correlation_id = %ctx.correlation_id()))]
    async fn post_order(&self, ctx: &RequestContext, request: &PostOrderRequest) -> Result<String> {
        let response =
            self.with_headers(self.client.post(self.url(ORDERS_PATH)), ctx).json(request).send().await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::error_from(response).await);
        }

        let accepted: PostOrderResponse = response.json().await?;
        debug!("Generation order accepted");
        Ok(parse_ref(&accepted.order_ref).to_string())
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn check_order(&self, ctx: &RequestContext, order_ref: &str) -> Result<OrderStatus> {
        let url = self.url(&format!("{}/{}", ORDERS_PATH, order_ref));
        let response = self
            .with_headers(self.client.get(url), ctx)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::error_from(response).await);
        }

        let order: CheckOrderResponse = response.json().await?;
        let secret_ref = order.secret_ref.as_deref().map(parse_ref).filter(|r| !r.is_empty());

        let status = match (order.status.as_str(), secret_ref) {
            ("ACTIVE", Some(secret_ref)) => {
                OrderStatus::Active { secret_ref: secret_ref.to_string() }
            }
            ("ERROR", _) => OrderStatus::Error { reason: order.error_reason },
            _ => OrderStatus::Pending,
        };

        Ok(status)
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn get_payload(
        &self,
        ctx: &RequestContext,
        secret_ref: &str,
        accept: PayloadContentType,
    ) -> Result<SecretString> {
        let url = self.url(&format!("{}/{}{}", SECRETS_PATH, secret_ref, PAYLOAD_PATH));
        let response = self
            .with_headers(self.client.get(url), ctx)
            .header(header::ACCEPT, accept.as_mime())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::error_from(response).await);
        }

        let body = response.bytes().await?;
        let payload = match accept {
            PayloadContentType::OctetStream => STANDARD.encode(&body),
            PayloadContentType::TextPlain => String::from_utf8(body.to_vec()).map_err(|_| {
                KeywardError::backend("Payload is not valid UTF-8 text", None)
            })?,
        };

        Ok(SecretString::new(payload))
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn delete_secret(&self, ctx: &RequestContext, secret_ref: &str) -> Result<()> {
        let url = self.url(&format!("{}/{}", SECRETS_PATH, secret_ref));
        let response = self.with_headers(self.client.delete(url), ctx).send().await?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(Self::error_from(response).await);
        }

        Ok(())
    }

    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    async fn delete_order(&self, ctx: &RequestContext, order_ref: &str) -> Result<()> {
        let url = self.url(&format!("{}/{}", ORDERS_PATH, order_ref));
        let response = self
            .with_headers(self.client.delete(url), ctx)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            return Err(KeywardError::backend("Unable to delete order", Some(status.as_u16())));
        }

        Ok(())
    }
}
