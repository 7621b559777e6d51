//! Handles shared by every reconciliation pass.

use std::sync::Arc;

use fvtt_reconcile::{Arbiter, OccupancyProbe, RouteConfig};
use fvtt_store::ResourceStore;

/// Explicit dependencies of a pass. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ResourceStore>,
    pub probe: Arc<dyn OccupancyProbe>,
    pub arbiter: Arbiter,
    pub routes: RouteConfig,
    pub namespace: String,
}

impl Context {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        probe: Arc<dyn OccupancyProbe>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            probe,
            arbiter: Arbiter::default(),
            routes: RouteConfig::default(),
            namespace: namespace.into(),
        }
    }

    pub fn with_arbiter(mut self, arbiter: Arbiter) -> Self {
        self.arbiter = arbiter;
        self
    }

    pub fn with_routes(mut self, routes: RouteConfig) -> Self {
        self.routes = routes;
        self
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }
}
