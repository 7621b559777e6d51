//! HTTP occupancy prober.
//!
//! Queries `GET /api/status` on a running Instance with its admin key as a
//! bearer token. Every failure is reported as a [`ProbeError`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fvtt_crd::{names, Instance};
use fvtt_reconcile::{Occupancy, OccupancyProbe, ProbeError};
use fvtt_store::{find_as, kinds, ResourceStore};
use serde_json::Value;
use tracing::debug;

use crate::secrets::read_secret_value;

/// Maps `(namespace, instance)` to the status URL to query.
pub type EndpointFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

const INTERNAL_HOST_MARKERS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    ".svc.cluster.local",
    ".k8s.orb.local",
];

/// Status URL for a host. Cluster-internal hosts are plain HTTP.
pub fn status_url(host: &str) -> String {
    let internal = INTERNAL_HOST_MARKERS.iter().any(|m| host.contains(m));
    let scheme = if internal { "http" } else { "https" };
    format!("{scheme}://{host}/api/status")
}

/// Read occupancy from a status response body.
pub fn parse_status(body: &Value) -> Result<Occupancy, ProbeError> {
    let users = body
        .get("users")
        .and_then(Value::as_u64)
        .ok_or_else(|| ProbeError::Malformed("missing integer `users` field".to_string()))?;
    let connected_users = u32::try_from(users)
        .map_err(|_| ProbeError::Malformed(format!("implausible user count {users}")))?;

    let active_world = match body.get("world") {
        Some(Value::String(world)) if !world.is_empty() => Some(world.clone()),
        _ => None,
    };

    Ok(Occupancy {
        connected_users,
        active_world,
        checked_at: Utc::now(),
    })
}

pub struct HttpOccupancyProber {
    client: reqwest::Client,
    timeout: Duration,
    store: Option<Arc<dyn ResourceStore>>,
    key_file: Option<PathBuf>,
    endpoint: EndpointFn,
}

impl HttpOccupancyProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout,
            store: None,
            key_file: None,
            endpoint: Arc::new(|namespace, instance| {
                status_url(&names::internal_hostname(instance, namespace))
            }),
        })
    }

    /// Look up each Instance's own admin secret in the store first.
    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Fall back to a mounted admin key.
    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    pub fn with_endpoint(
        mut self,
        endpoint: impl Fn(&str, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.endpoint = Arc::new(endpoint);
        self
    }

    async fn admin_key(&self, namespace: &str, instance: &str) -> Result<String, ProbeError> {
        if let Some(store) = &self.store {
            match instance_secret(store.as_ref(), namespace, instance).await {
                Ok(Some(key)) => return Ok(key),
                Ok(None) => {}
                Err(e) => debug!(instance = %instance, error = %e, "Instance admin secret unavailable"),
            }
        }

        if let Some(path) = &self.key_file {
            match tokio::fs::read_to_string(path).await {
                Ok(key) if !key.trim().is_empty() => return Ok(key.trim().to_string()),
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Admin key file unreadable"),
            }
        }

        Err(ProbeError::MissingCredentials)
    }
}

async fn instance_secret(
    store: &dyn ResourceStore,
    namespace: &str,
    instance: &str,
) -> anyhow::Result<Option<String>> {
    let Some(record) = find_as::<Instance>(store, &kinds::INSTANCE, namespace, instance).await?
    else {
        return Ok(None);
    };
    Ok(read_secret_value(store, namespace, &record.admin_secret_name()).await?)
}

#[async_trait]
impl OccupancyProbe for HttpOccupancyProber {
    async fn probe(&self, namespace: &str, instance: &str) -> Result<Occupancy, ProbeError> {
        let key = self.admin_key(namespace, instance).await?;
        let url = (self.endpoint)(namespace, instance);
        debug!(instance = %instance, url = %url, "Probing occupancy");

        let response = self
            .client
            .get(&url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(self.timeout)
                } else {
                    ProbeError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProbeError::Malformed(e.to_string()))?;
        parse_status(&body)
    }
}
