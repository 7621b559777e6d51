//! Admin password secrets.
//!
//! A secret value is created lazily, reused verbatim, and replaced only on an
//! explicit regeneration request. Concurrent creators race on the store's
//! create: the loser re-reads and adopts the winner's value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fvtt_store::{kinds, ResourceStore, StoreError};
use rand::Rng;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

/// Key under which the admin password is stored in the secret.
pub const PASSWORD_KEY: &str = "adminPassword";

/// Length of generated admin passwords.
pub const PASSWORD_LENGTH: usize = 24;

const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("secret {name} holds an undecodable admin password: {message}")]
    Undecodable { name: String, message: String },

    #[error("secret {0} reported as existing but could not be read back")]
    Vanished(String),
}

/// Outcome of [`resolve_secret`].
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    /// This call created the secret.
    pub created: bool,
    /// The value changed and its owner has not been told yet.
    pub notify_pending: bool,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<redacted>")
            .field("created", &self.created)
            .field("notify_pending", &self.notify_pending)
            .finish()
    }
}

/// Generate a fresh admin password.
pub fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..PASSWORD_LENGTH)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

fn encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Extract the password from a secret object, if it holds one.
fn decode(name: &str, secret: &Value) -> Result<Option<String>, SecretError> {
    let Some(raw) = secret
        .pointer(&format!("/data/{PASSWORD_KEY}"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| SecretError::Undecodable {
            name: name.to_string(),
            message: e.to_string(),
        })?;
    let value = String::from_utf8(bytes).map_err(|e| SecretError::Undecodable {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    Ok(Some(value).filter(|v| !v.is_empty()))
}

/// Read the admin password held by a secret. `None` when the secret or the
/// key is absent.
pub async fn read_secret_value(
    store: &dyn ResourceStore,
    namespace: &str,
    name: &str,
) -> Result<Option<String>, SecretError> {
    match store.get(&kinds::SECRET, namespace, name).await {
        Ok(secret) => decode(name, &secret),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reuse, regenerate or create the admin password held by secret `name`.
pub async fn resolve_secret(
    store: &dyn ResourceStore,
    namespace: &str,
    name: &str,
    regenerate: bool,
) -> Result<ResolvedSecret, SecretError> {
    let existing = match store.get(&kinds::SECRET, namespace, name).await {
        Ok(secret) => Some(secret),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    if let Some(secret) = existing {
        let current = decode(name, &secret)?;
        if let (Some(value), false) = (&current, regenerate) {
            debug!(secret = %name, "Reusing existing admin password");
            return Ok(ResolvedSecret {
                value: value.clone(),
                created: false,
                notify_pending: false,
            });
        }

        let value = generate_password();
        store
            .patch(
                &kinds::SECRET,
                namespace,
                name,
                &json!({"data": {(PASSWORD_KEY): encode(&value)}}),
            )
            .await?;
        info!(secret = %name, regenerated = regenerate, "Wrote new admin password");
        return Ok(ResolvedSecret {
            value,
            created: false,
            notify_pending: true,
        });
    }

    let value = generate_password();
    let object = json!({
        "metadata": {
            "name": name,
            "labels": {"app": "foundry-vtt"},
        },
        "type": "Opaque",
        "data": {(PASSWORD_KEY): encode(&value)},
    });

    match store.create(&kinds::SECRET, namespace, &object).await {
        Ok(_) => {
            info!(secret = %name, "Created admin password secret");
            Ok(ResolvedSecret {
                value,
                created: true,
                notify_pending: true,
            })
        }
        Err(e) if e.is_conflict() => {
            debug!(secret = %name, "Lost creation race; adopting existing value");
            let winner = read_secret_value(store, namespace, name)
                .await?
                .ok_or_else(|| SecretError::Vanished(name.to_string()))?;
            Ok(ResolvedSecret {
                value: winner,
                created: false,
                notify_pending: false,
            })
        }
        Err(e) => Err(e.into()),
    }
}
