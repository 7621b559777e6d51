//! License reconciliation pass.
//!
//! Each pass re-reads the License and its Instances, arbitrates the actual
//! holder, regenerates every route, prunes routes no longer produced, and
//! writes the decision to the License status.

use std::collections::BTreeSet;
use std::time::Duration;

use fvtt_crd::{annotations, Instance, License};
use fvtt_reconcile::{
    active_count, generate_routes, registered_instances, ArbitrationInput, RouteDescriptor,
    Verdict,
};
use fvtt_store::{apply, get_as, kinds, list_as, object_name, ResourceKind, ResourceStore};
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::context::Context;
use crate::error::{ControllerError, ControllerResult};

/// What one pass decided and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseOutcome {
    pub holder: Option<String>,
    pub warning: Option<String>,
    pub verdict: Verdict,
    pub routes: usize,
    pub pruned: usize,
}

/// Reconcile one License.
#[instrument(skip(ctx), fields(namespace = %ctx.namespace))]
pub async fn reconcile_license(ctx: &Context, name: &str) -> ControllerResult<LicenseOutcome> {
    let store = ctx.store();
    let namespace = ctx.namespace.as_str();

    let license: License = get_as(store, &kinds::LICENSE, namespace, name).await?;
    license
        .validate()
        .map_err(|e| ControllerError::invalid(name, e))?;

    let instances: Vec<Instance> = list_as::<Instance>(store, &kinds::INSTANCE, namespace, None)
        .await?
        .into_iter()
        .filter(|i| i.license_name() == name)
        .collect();

    // A holder whose Instance is gone cannot be probed; the License is vacant.
    let current = license
        .current_holder()
        .filter(|holder| instances.iter().any(|i| i.name() == *holder));
    if current.is_none() {
        if let Some(missing) = license.current_holder() {
            warn!(license = %name, holder = %missing, "Recorded holder no longer exists");
        }
    }

    // A desired holder that does not exist is refused; the current holder stays.
    let missing_desired = license
        .desired_holder()
        .filter(|wanted| !instances.iter().any(|i| i.name() == *wanted));
    let desired = match missing_desired {
        Some(_) => current,
        None => license.desired_holder(),
    };

    let pending: BTreeSet<String> = instances
        .iter()
        .filter(|i| i.is_pending_deletion())
        .map(|i| i.name().to_string())
        .collect();

    let mut decision = ctx
        .arbiter
        .arbitrate(
            &ArbitrationInput {
                namespace,
                desired,
                current,
                mode: license.spec.switch_mode,
                pending_deletion: &pending,
            },
            ctx.probe.as_ref(),
        )
        .await;
    if let Some(wanted) = missing_desired {
        warn!(license = %name, instance = %wanted, "Requested holder does not exist");
        decision
            .warning
            .get_or_insert_with(|| format!("Instance '{wanted}' does not exist"));
    }

    let routes = generate_routes(
        &license,
        &instances,
        decision.holder.as_deref(),
        &ctx.routes,
    );
    debug_assert!(active_count(&routes) <= 1);

    apply_routes(store, namespace, &routes).await?;
    let pruned = prune_routes(store, namespace, name, &routes).await?;

    let status = json!({
        "status": {
            "activeInstance": decision.holder,
            "registeredInstances": registered_instances(&routes),
            "warning": decision.warning,
        }
    });
    store
        .patch_status(&kinds::LICENSE, namespace, name, &status)
        .await?;

    match decision.verdict {
        Verdict::Unchanged => debug!(license = %name, "License unchanged"),
        Verdict::Denied => warn!(
            license = %name,
            warning = decision.warning.as_deref().unwrap_or_default(),
            "Switch denied"
        ),
        verdict => info!(
            license = %name,
            holder = decision.holder.as_deref().unwrap_or("<none>"),
            verdict = ?verdict,
            "License holder updated"
        ),
    }
    if decision.deletion_override {
        warn!(license = %name, "Pending-deletion instance kept from holding the license");
    }

    Ok(LicenseOutcome {
        holder: decision.holder,
        warning: decision.warning,
        verdict: decision.verdict,
        routes: routes.len(),
        pruned,
    })
}

async fn apply_routes(
    store: &dyn ResourceStore,
    namespace: &str,
    routes: &[RouteDescriptor],
) -> ControllerResult<()> {
    for route in routes {
        apply(store, &kinds::HTTP_ROUTE, &route.to_manifest()).await?;
        if let Some(dns) = &route.dns {
            apply(
                store,
                &kinds::DNS_ENDPOINT,
                &dns.to_manifest(&route.license, &route.instance),
            )
            .await?;
        }
        debug!(namespace = %namespace, route = %route.name, state = %route.state, "Applied route");
    }
    Ok(())
}

/// Delete generated objects labelled for this License that the pass no
/// longer produces.
async fn prune_routes(
    store: &dyn ResourceStore,
    namespace: &str,
    license: &str,
    routes: &[RouteDescriptor],
) -> ControllerResult<usize> {
    let selector = format!("{}={license}", annotations::LICENSE_LABEL);
    let route_names: BTreeSet<&str> = routes.iter().map(|r| r.name.as_str()).collect();
    let dns_names: BTreeSet<&str> = routes
        .iter()
        .filter_map(|r| r.dns.as_ref().map(|d| d.name.as_str()))
        .collect();

    let mut pruned = 0;
    for (kind, keep) in [(&kinds::HTTP_ROUTE, &route_names), (&kinds::DNS_ENDPOINT, &dns_names)] {
        for object in list_generated(store, kind, namespace, &selector).await? {
            let Some(stale) = object_name(&object) else {
                continue;
            };
            if keep.contains(stale) {
                continue;
            }
            match store.delete(kind, namespace, stale).await {
                Ok(()) => {
                    info!(kind = %kind.kind, name = %stale, "Pruned stale route object");
                    pruned += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(pruned)
}

/// List generated objects, treating an uninstalled kind as empty.
async fn list_generated(
    store: &dyn ResourceStore,
    kind: &ResourceKind,
    namespace: &str,
    selector: &str,
) -> ControllerResult<Vec<Value>> {
    match store.list(kind, namespace, Some(selector)).await {
        Ok(items) => Ok(items),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Reconcile every License in the namespace. Passes run concurrently; one
/// failing License does not stop the others.
pub async fn reconcile_all(
    ctx: &Context,
) -> ControllerResult<Vec<(String, ControllerResult<LicenseOutcome>)>> {
    let licenses: Vec<License> =
        list_as(ctx.store(), &kinds::LICENSE, &ctx.namespace, None).await?;

    let passes = licenses.iter().map(|license| async move {
        let name = license.name().to_string();
        let result = reconcile_license(ctx, &name).await;
        (name, result)
    });

    Ok(join_all(passes).await)
}

/// Periodically reconciles all Licenses.
pub struct LicenseWorker {
    ctx: Context,
    interval: Duration,
}

impl LicenseWorker {
    pub fn new(ctx: Context, interval: Duration) -> Self {
        Self { ctx, interval }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting license worker"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_pass().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("License worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn run_pass(&self) {
        match reconcile_all(&self.ctx).await {
            Ok(results) => {
                for (license, result) in results {
                    if let Err(e) = result {
                        error!(license = %license, error = %e, "License reconciliation failed");
                    }
                }
            }
            Err(e) => error!(error = %e, "Failed to list licenses"),
        }
    }
}
