//! Resource store access.
//!
//! The store is the single source of truth for License, Instance, Password
//! and derived route records. This crate exposes it through the
//! [`ResourceStore`] trait so that reconciliation code never holds a global
//! client handle:
//!
//! - [`HttpStore`] talks to a Kubernetes-style REST API.
//! - [`MemoryStore`] keeps records in process, for tests and local runs.
//!
//! Every operation returns a [`StoreError`] variant instead of raising, so
//! callers branch on `NotFound` / `Conflict` / `ValidationDenied` as ordinary
//! control flow.
//!
//! # Semantics
//!
//! - Patches are JSON merge patches: objects merge recursively, a `null`
//!   value removes the field.
//! - `create` fails with `Conflict` when the name is taken.
//! - Nothing is transactional across records.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

mod http;
pub mod kinds;
mod memory;
mod merge;

pub use http::{HttpStore, HttpStoreConfig};
pub use kinds::ResourceKind;
pub use memory::{AdmissionHook, MemoryStore};
pub use merge::merge_patch;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store access errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name already taken or concurrent modification.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store's admission layer rejected the write. Message is verbatim.
    #[error("{0}")]
    ValidationDenied(String),

    /// The store could not be reached or answered unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// A record could not be decoded into its typed form.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The client is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_validation_denied(&self) -> bool {
        matches!(self, StoreError::ValidationDenied(_))
    }
}

/// Typed access to records keyed by (kind, namespace, name).
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one record.
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> StoreResult<Value>;

    /// List records in a namespace, optionally filtered by a `k=v,k2=v2` selector.
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> StoreResult<Vec<Value>>;

    /// Create a record. `Conflict` if the name is taken.
    async fn create(&self, kind: &ResourceKind, namespace: &str, object: &Value)
        -> StoreResult<Value>;

    /// Merge-patch a record's spec/metadata.
    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> StoreResult<Value>;

    /// Merge-patch a record's status subresource.
    async fn patch_status(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> StoreResult<Value>;

    /// Delete a record. `NotFound` if it is already gone.
    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> StoreResult<()>;
}

/// Fetch and decode a record.
pub async fn get_as<T: DeserializeOwned>(
    store: &dyn ResourceStore,
    kind: &ResourceKind,
    namespace: &str,
    name: &str,
) -> StoreResult<T> {
    let value = store.get(kind, namespace, name).await?;
    Ok(serde_json::from_value(value)?)
}

/// Fetch and decode a record, mapping `NotFound` to `None`.
pub async fn find_as<T: DeserializeOwned>(
    store: &dyn ResourceStore,
    kind: &ResourceKind,
    namespace: &str,
    name: &str,
) -> StoreResult<Option<T>> {
    match get_as(store, kind, namespace, name).await {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// List and decode records. Records that fail to decode are skipped and logged.
pub async fn list_as<T: DeserializeOwned>(
    store: &dyn ResourceStore,
    kind: &ResourceKind,
    namespace: &str,
    label_selector: Option<&str>,
) -> StoreResult<Vec<T>> {
    let items = store.list(kind, namespace, label_selector).await?;
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let name = object_name(&item).unwrap_or("<unnamed>").to_string();
        match serde_json::from_value(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(kind = %kind.kind, name = %name, error = %e, "Skipping undecodable record");
            }
        }
    }
    Ok(records)
}

/// Create a record or, if it already exists, merge it over the stored one.
pub async fn apply(store: &dyn ResourceStore, kind: &ResourceKind, object: &Value) -> StoreResult<Value> {
    let name = object_name(object)
        .ok_or_else(|| StoreError::Config("object has no metadata.name".to_string()))?
        .to_string();
    let namespace = object_namespace(object).unwrap_or_default().to_string();

    match store.create(kind, &namespace, object).await {
        Err(StoreError::Conflict(_)) => store.patch(kind, &namespace, &name, object).await,
        other => other,
    }
}

/// `metadata.name` of a raw object.
pub fn object_name(object: &Value) -> Option<&str> {
    object.pointer("/metadata/name").and_then(Value::as_str)
}

/// `metadata.namespace` of a raw object.
pub fn object_namespace(object: &Value) -> Option<&str> {
    object.pointer("/metadata/namespace").and_then(Value::as_str)
}
