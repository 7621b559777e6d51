#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fvtt_controller::Context;
use fvtt_reconcile::{Occupancy, OccupancyProbe, ProbeError};
use fvtt_store::{kinds, MemoryStore, ResourceStore};
use serde_json::{json, Value};

pub const NS: &str = "foundry-vtt";

/// Probe answering from a table and counting calls. Unknown instances are
/// unreachable.
#[derive(Default)]
pub struct FakeProbe {
    answers: Mutex<HashMap<String, Result<Occupancy, ProbeError>>>,
    calls: AtomicUsize,
    probed: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(self, instance: &str, users: u32) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(instance.to_string(), Ok(Occupancy::new(users)));
        self
    }

    pub fn world(self, instance: &str, users: u32, world: &str) -> Self {
        let mut occupancy = Occupancy::new(users);
        occupancy.active_world = Some(world.to_string());
        self.answers
            .lock()
            .unwrap()
            .insert(instance.to_string(), Ok(occupancy));
        self
    }

    pub fn failing(self, instance: &str, error: ProbeError) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(instance.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl OccupancyProbe for FakeProbe {
    async fn probe(&self, _namespace: &str, instance: &str) -> Result<Occupancy, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.probed.lock().unwrap().push(instance.to_string());
        self.answers
            .lock()
            .unwrap()
            .get(instance)
            .cloned()
            .unwrap_or_else(|| Err(ProbeError::Transport("unreachable".to_string())))
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub probe: Arc<FakeProbe>,
    pub ctx: Context,
}

pub fn fixture(probe: FakeProbe) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(probe);
    let ctx = Context::new(
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        Arc::clone(&probe) as Arc<dyn OccupancyProbe>,
        NS,
    );
    Fixture { store, probe, ctx }
}

pub fn license(name: &str, desired: Option<&str>, current: Option<&str>, mode: &str) -> Value {
    let mut record = json!({
        "metadata": {"name": name, "namespace": NS},
        "spec": {
            "switchMode": mode,
            "gateway": {"baseDomain": "play.example"},
            "licenseSecretRef": {"name": format!("{name}-key"), "key": "license"},
        },
    });
    if let Some(desired) = desired {
        record["spec"]["activeInstanceName"] = json!(desired);
    }
    if let Some(current) = current {
        record["status"] = json!({"activeInstance": current});
    }
    record
}

pub fn instance(name: &str, license: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": NS},
        "spec": {"licenseRef": {"name": license}},
    })
}

pub fn pending_instance(name: &str, license: &str, delete_at: &str) -> Value {
    let mut record = instance(name, license);
    record["metadata"]["annotations"] =
        json!({"foundry.platform/scheduled-delete-at": delete_at});
    record
}

impl Fixture {
    pub async fn seed_license(&self, record: Value) {
        self.store.insert(&kinds::LICENSE, record).await;
    }

    pub async fn seed_instances(&self, records: Vec<Value>) {
        for record in records {
            self.store.insert(&kinds::INSTANCE, record).await;
        }
    }

    pub async fn get(&self, kind: &fvtt_store::ResourceKind, name: &str) -> Value {
        self.store.get(kind, NS, name).await.unwrap()
    }

    pub async fn license_status(&self, name: &str) -> Value {
        self.get(&kinds::LICENSE, name).await["status"].clone()
    }
}
