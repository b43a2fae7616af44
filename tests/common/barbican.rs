//! Canned Barbican responses on a wiremock server.

#![allow(clippy::duplicate_mod)]

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockGuard, MockServer, ResponseTemplate};

pub struct MockBarbican {
    pub server: MockServer,
}

impl MockBarbican {
    pub fn new(server: MockServer) -> Self {
        Self { server }
    }

    fn resource_uri(&self, collection: &str, reference: &str) -> String {
        format!("{}/v1/{}/{}", self.server.uri(), collection, reference)
    }

    /// Accept any stored secret, answering with `secret_ref`
    pub async fn accept_secrets(&self, secret_ref: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/secrets"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "secret_ref": self.resource_uri("secrets", secret_ref)
            })))
            .mount(&self.server)
            .await;
    }

    /// Accept any generation order, answering with `order_ref`
    pub async fn accept_orders(&self, order_ref: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "order_ref": self.resource_uri("orders", order_ref)
            })))
            .mount(&self.server)
            .await;
    }

    /// Report the order as still generating until the guard drops
    pub async fn order_pending(&self, order_ref: &str) -> MockGuard {
        Mock::given(method("GET"))
            .and(path(format!("/v1/orders/{}", order_ref)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
            .mount_as_scoped(&self.server)
            .await
    }

    pub async fn order_active(&self, order_ref: &str, secret_ref: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/orders/{}", order_ref)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ACTIVE",
                "secret_ref": self.resource_uri("secrets", secret_ref)
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn order_failed(&self, order_ref: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/orders/{}", order_ref)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ERROR",
                "error_reason": "Key generation failed"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn payload(&self, secret_ref: &str, body: &'static [u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/secrets/{}/payload", secret_ref)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    /// Expect exactly `times` deletions of the secret
    pub async fn expect_secret_delete(&self, secret_ref: &str, times: u64) {
        Mock::given(method("DELETE"))
            .and(path(format!("/v1/secrets/{}", secret_ref)))
            .respond_with(ResponseTemplate::new(204))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn expect_order_delete(&self, order_ref: &str, times: u64) {
        Mock::given(method("DELETE"))
            .and(path(format!("/v1/orders/{}", order_ref)))
            .respond_with(ResponseTemplate::new(204))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Number of DELETE requests the server has seen
    pub async fn delete_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.method.to_string() == "DELETE")
            .count()
    }
}
