//! Store backed by a Kubernetes-style REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::kinds::ResourceKind;
use crate::merge::merge_patch;
use crate::{ResourceStore, StoreError, StoreResult};

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL of the API server, e.g. `https://kubernetes.default.svc`.
    pub api_server: String,

    /// Bearer token sent with every request.
    pub token: Option<String>,

    /// Extra PEM root certificate to trust.
    pub ca_cert_pem: Option<Vec<u8>>,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpStoreConfig {
    pub fn new(api_server: impl Into<String>) -> Self {
        Self {
            api_server: api_server.into(),
            token: None,
            ca_cert_pem: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// REST client for the resource store.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    /// Build a client from connection settings.
    pub fn new(config: HttpStoreConfig) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| StoreError::Config("invalid bearer token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout);

        if let Some(pem) = &config.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| StoreError::Config(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_server.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<(&Value, &'static str)>,
        query: Option<(&str, &str)>,
    ) -> StoreResult<Value> {
        debug!(method = %method, path = %path, "Store request");

        let mut request = self.client.request(method, self.url(path));
        if let Some((key, value)) = query {
            request = request.query(&[(key, value)]);
        }
        if let Some((body, content_type)) = body {
            request = request
                .header(CONTENT_TYPE, content_type)
                .body(body.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        Err(classify(status, path, &text))
    }
}

/// Map a failed response to the store error taxonomy.
fn classify(status: StatusCode, path: &str, body: &str) -> StoreError {
    // Status objects carry a human-readable `message`.
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(if message.is_empty() {
            path.to_string()
        } else {
            message
        }),
        StatusCode::CONFLICT => StoreError::Conflict(message),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
            StoreError::ValidationDenied(message)
        }
        other => StoreError::Transport(format!("{other}: {message}")),
    }
}

#[async_trait]
impl ResourceStore for HttpStore {
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> StoreResult<Value> {
        self.send(Method::GET, &kind.object_path(namespace, name), None, None)
            .await
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        let query = label_selector
            .filter(|s| !s.is_empty())
            .map(|s| ("labelSelector", s));
        let body = self
            .send(Method::GET, &kind.collection_path(namespace), None, query)
            .await?;

        match body.get("items") {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(StoreError::Transport(format!(
                "unexpected list body for {}: {other}",
                kind.kind
            ))),
        }
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        object: &Value,
    ) -> StoreResult<Value> {
        let mut object = object.clone();
        merge_patch(
            &mut object,
            &json!({
                "apiVersion": kind.api_version(),
                "kind": kind.kind,
                "metadata": {"namespace": namespace},
            }),
        );
        self.send(
            Method::POST,
            &kind.collection_path(namespace),
            Some((&object, "application/json")),
            None,
        )
        .await
    }

    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> StoreResult<Value> {
        self.send(
            Method::PATCH,
            &kind.object_path(namespace, name),
            Some((patch, MERGE_PATCH)),
            None,
        )
        .await
    }

    async fn patch_status(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> StoreResult<Value> {
        let path = format!("{}/status", kind.object_path(namespace, name));
        self.send(Method::PATCH, &path, Some((patch, MERGE_PATCH)), None)
            .await
    }

    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> StoreResult<()> {
        self.send(Method::DELETE, &kind.object_path(namespace, name), None, None)
            .await
            .map(|_| ())
    }
}
