//! In-process store for tests and local development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::kinds::ResourceKind;
use crate::merge::merge_patch;
use crate::{ResourceStore, StoreError, StoreResult};

/// Admission check run against the merged record before a patch commits.
///
/// Returning `Err(message)` rejects the write with `ValidationDenied(message)`.
pub type AdmissionHook = Arc<dyn Fn(&ResourceKind, &Value) -> Result<(), String> + Send + Sync>;

type Key = (&'static str, String, String);

/// Store holding records in a map, with merge-patch and create-conflict semantics.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<Key, Value>>,
    version: AtomicU64,
    admission: Option<AdmissionHook>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose patches pass through an admission check.
    pub fn with_admission(hook: AdmissionHook) -> Self {
        Self {
            admission: Some(hook),
            ..Self::default()
        }
    }

    /// Insert or replace a record verbatim, status included.
    pub async fn insert(&self, kind: &ResourceKind, object: Value) {
        let Some(key) = key_of(kind, &object) else {
            return;
        };
        let object = self.stamp(object);
        self.objects.lock().await.insert(key, object);
    }

    /// Number of stored records of a kind.
    pub async fn count(&self, kind: &ResourceKind) -> usize {
        self.objects
            .lock()
            .await
            .keys()
            .filter(|(plural, _, _)| *plural == kind.plural)
            .count()
    }

    fn stamp(&self, mut object: Value) -> Value {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        merge_patch(
            &mut object,
            &json!({"metadata": {"resourceVersion": version.to_string()}}),
        );
        object
    }

    async fn patch_inner(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> StoreResult<Value> {
        let key = (kind.plural, namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().await;
        let current = objects
            .get(&key)
            .ok_or_else(|| not_found(kind, namespace, name))?;

        let mut updated = current.clone();
        merge_patch(&mut updated, patch);

        if let Some(hook) = &self.admission {
            hook(kind, &updated).map_err(StoreError::ValidationDenied)?;
        }

        let updated = self.stamp(updated);
        objects.insert(key, updated.clone());
        Ok(updated)
    }
}

fn key_of(kind: &ResourceKind, object: &Value) -> Option<Key> {
    let name = crate::object_name(object)?;
    let namespace = crate::object_namespace(object).unwrap_or_default();
    Some((kind.plural, namespace.to_string(), name.to_string()))
}

fn not_found(kind: &ResourceKind, namespace: &str, name: &str) -> StoreError {
    StoreError::NotFound(format!("{} {namespace}/{name}", kind.kind))
}

fn matches_selector(object: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        return true;
    };
    let labels = object.pointer("/metadata/labels");

    selector.split(',').all(|term| {
        let (key, expected) = term.split_once('=').unwrap_or((term, ""));
        let actual = labels
            .and_then(|l| l.get(key.trim()))
            .and_then(Value::as_str);
        if expected.is_empty() {
            actual.is_some()
        } else {
            actual == Some(expected.trim())
        }
    })
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> StoreResult<Value> {
        let key = (kind.plural, namespace.to_string(), name.to_string());
        self.objects
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(kind, namespace, name))
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .filter(|((plural, ns, _), _)| *plural == kind.plural && ns == namespace)
            .map(|(_, v)| v)
            .filter(|v| matches_selector(v, label_selector))
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        object: &Value,
    ) -> StoreResult<Value> {
        let mut object = object.clone();
        merge_patch(&mut object, &json!({"metadata": {"namespace": namespace}}));
        let key = key_of(kind, &object)
            .ok_or_else(|| StoreError::Config("object has no metadata.name".to_string()))?;

        let mut objects = self.objects.lock().await;
        if objects.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{} {namespace}/{} already exists",
                kind.kind, key.2
            )));
        }

        debug!(kind = %kind.kind, namespace = %namespace, name = %key.2, "Created record");
        let object = self.stamp(object);
        objects.insert(key, object.clone());
        Ok(object)
    }

    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> StoreResult<Value> {
        let mut patch = patch.clone();
        if let Value::Object(map) = &mut patch {
            map.remove("status");
        }
        self.patch_inner(kind, namespace, name, &patch).await
    }

    async fn patch_status(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> StoreResult<Value> {
        let status = patch.get("status").cloned().unwrap_or(Value::Null);
        self.patch_inner(kind, namespace, name, &json!({ "status": status }))
            .await
    }

    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> StoreResult<()> {
        let key = (kind.plural, namespace.to_string(), name.to_string());
        self.objects
            .lock()
            .await
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| not_found(kind, namespace, name))
    }
}
