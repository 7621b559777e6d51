//! Instance pass: password regeneration intents and occupancy monitoring.

use std::time::Duration;

use chrono::Utc;
use fvtt_crd::{annotations, names, Instance, License};
use fvtt_store::{kinds, list_as};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::context::Context;
use crate::error::ControllerResult;

/// Turn `spec.regeneratePassword` flags into refresh requests on the
/// Instance's password record, then clear the flag. Returns the number of
/// Instances handled.
#[instrument(skip(ctx), fields(namespace = %ctx.namespace))]
pub async fn process_regeneration_requests(ctx: &Context) -> ControllerResult<usize> {
    let store = ctx.store();
    let namespace = ctx.namespace.as_str();
    let instances: Vec<Instance> = list_as(store, &kinds::INSTANCE, namespace, None).await?;

    let mut handled = 0;
    for instance in instances.iter().filter(|i| i.wants_password_regeneration()) {
        let record = names::instance_password_name(instance.name());
        let token = Utc::now().timestamp().to_string();

        match store
            .patch(
                &kinds::PASSWORD,
                namespace,
                &record,
                &json!({"metadata": {"annotations": {(annotations::FORCE_SYNC): token}}}),
            )
            .await
        {
            Ok(_) => info!(instance = %instance.name(), record = %record, "Password refresh requested"),
            Err(e) if e.is_not_found() => {
                warn!(instance = %instance.name(), record = %record, "No password record to refresh")
            }
            Err(e) => return Err(e.into()),
        }

        store
            .patch(
                &kinds::INSTANCE,
                namespace,
                instance.name(),
                &json!({"spec": {"regeneratePassword": null}}),
            )
            .await?;
        handled += 1;
    }

    Ok(handled)
}

/// Probe the holder of every License and record its occupancy on the
/// Instance status. Returns the number of Instances probed.
#[instrument(skip(ctx), fields(namespace = %ctx.namespace))]
pub async fn monitor_occupancy(ctx: &Context) -> ControllerResult<usize> {
    let store = ctx.store();
    let namespace = ctx.namespace.as_str();
    let licenses: Vec<License> = list_as(store, &kinds::LICENSE, namespace, None).await?;

    let mut probed = 0;
    for holder in licenses.iter().filter_map(License::current_holder) {
        let status = match ctx.probe.probe(namespace, holder).await {
            Ok(occupancy) => {
                debug!(instance = %holder, users = occupancy.connected_users, "Occupancy observed");
                json!({
                    "status": {
                        "connectedPlayers": occupancy.connected_users,
                        "activeWorld": occupancy.active_world,
                        "lastProbeAt": occupancy.checked_at,
                        "probeError": null,
                    }
                })
            }
            Err(e) => {
                warn!(instance = %holder, error = %e, "Occupancy probe failed");
                json!({
                    "status": {
                        "connectedPlayers": null,
                        "lastProbeAt": Utc::now(),
                        "probeError": e.to_string(),
                    }
                })
            }
        };

        match store
            .patch_status(&kinds::INSTANCE, namespace, holder, &status)
            .await
        {
            Ok(_) => probed += 1,
            Err(e) if e.is_not_found() => debug!(instance = %holder, "Holder vanished before status write"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(probed)
}

/// Handles regeneration requests every `interval` and monitors occupancy
/// every `monitor_interval`.
pub struct InstanceWorker {
    ctx: Context,
    interval: Duration,
    monitor_interval: Duration,
}

impl InstanceWorker {
    pub fn new(ctx: Context, interval: Duration, monitor_interval: Duration) -> Self {
        Self {
            ctx,
            interval,
            monitor_interval,
        }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            monitor_interval_secs = self.monitor_interval.as_secs(),
            "Starting instance worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        let mut monitor_interval = tokio::time::interval(self.monitor_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = process_regeneration_requests(&self.ctx).await {
                        error!(error = %e, "Password regeneration pass failed");
                    }
                }
                _ = monitor_interval.tick() => {
                    if let Err(e) = monitor_occupancy(&self.ctx).await {
                        error!(error = %e, "Occupancy monitor failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Instance worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
