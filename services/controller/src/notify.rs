//! Delivery of new admin passwords to their owners.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fvtt_crd::{Password, PasswordType};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification endpoint returned HTTP {0}")]
    Status(u16),
}

/// A password value ready to hand to its owner.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordNotification {
    pub record: String,
    pub namespace: String,
    pub password_type: PasswordType,
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,
    pub instance: Option<String>,
    pub password: String,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl PasswordNotification {
    pub fn new(record: &Password, password: String) -> Self {
        Self {
            record: record.name().to_string(),
            namespace: record.namespace().to_string(),
            password_type: record.spec.password_type,
            owner_id: record.owner_id().map(str::to_string),
            owner_name: record.owner_name().map(str::to_string),
            instance: record.instance_name().map(str::to_string),
            password,
            refreshed_at: record.status.as_ref().and_then(|s| s.last_refreshed),
        }
    }
}

impl std::fmt::Debug for PasswordNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordNotification")
            .field("record", &self.record)
            .field("owner_id", &self.owner_id)
            .field("instance", &self.instance)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hands a password to its owner. Returning `Ok` confirms delivery.
#[async_trait]
pub trait PasswordNotifier: Send + Sync {
    async fn deliver(&self, notification: &PasswordNotification) -> Result<(), NotifyError>;
}

/// Posts notifications as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PasswordNotifier for WebhookNotifier {
    async fn deliver(&self, notification: &PasswordNotification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Records that a password is ready without sending it anywhere.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl PasswordNotifier for LogNotifier {
    async fn deliver(&self, notification: &PasswordNotification) -> Result<(), NotifyError> {
        info!(
            record = %notification.record,
            owner_id = notification.owner_id.as_deref().unwrap_or("<none>"),
            instance = notification.instance.as_deref().unwrap_or("<none>"),
            "Admin password ready for its owner"
        );
        Ok(())
    }
}
