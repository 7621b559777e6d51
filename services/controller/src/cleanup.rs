use std::time::Duration;

use chrono::{DateTime, Utc};
use fvtt_crd::{names, Instance, License};
use fvtt_store::{find_as, kinds, list_as, ResourceKind, ResourceStore};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::context::Context;
use crate::error::ControllerResult;

#[derive(Debug, Clone)]
pub struct CleanupWorkerConfig {
    pub interval: Duration,
}

impl Default for CleanupWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

/// Instances whose scheduled deletion time has passed.
pub fn expired_instances(instances: &[Instance], now: DateTime<Utc>) -> Vec<&Instance> {
    instances
        .iter()
        .filter(|instance| match instance.scheduled_delete_at() {
            Some(Ok(at)) => at <= now,
            Some(Err(e)) => {
                warn!(instance = %instance.name(), error = %e, "Skipping unparseable deletion time");
                false
            }
            None => false,
        })
        .collect()
}

async fn delete_if_present(
    store: &dyn ResourceStore,
    kind: &ResourceKind,
    namespace: &str,
    name: &str,
) -> ControllerResult<bool> {
    match store.delete(kind, namespace, name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Clear the License's desired holder when it names `instance`, so the
/// next pass does not activate a deleted Instance.
async fn release_license(
    store: &dyn ResourceStore,
    namespace: &str,
    instance: &Instance,
) -> ControllerResult<bool> {
    let license_name = instance.license_name();
    let Some(license) =
        find_as::<License>(store, &kinds::LICENSE, namespace, license_name).await?
    else {
        return Ok(false);
    };
    if license.desired_holder() != Some(instance.name()) {
        return Ok(false);
    }

    let patch = json!({"spec": {"activeInstanceName": null}});
    match store
        .patch(&kinds::LICENSE, namespace, license_name, &patch)
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Delete expired Instances together with their per-instance password
/// record and secret. Returns the number of Instances removed.
#[instrument(skip(ctx), fields(namespace = %ctx.namespace))]
pub async fn cleanup_expired(ctx: &Context, now: DateTime<Utc>) -> ControllerResult<usize> {
    let store = ctx.store();
    let namespace = ctx.namespace.as_str();
    let instances: Vec<Instance> = list_as(store, &kinds::INSTANCE, namespace, None).await?;

    let mut deleted = 0;
    for instance in expired_instances(&instances, now) {
        let name = instance.name();
        let record = names::instance_password_name(name);

        if release_license(store, namespace, instance).await? {
            info!(
                instance = %name,
                license = %instance.license_name(),
                "Released license held by expired instance"
            );
        }
        if delete_if_present(store, &kinds::INSTANCE, namespace, name).await? {
            deleted += 1;
        }
        if delete_if_present(store, &kinds::PASSWORD, namespace, &record).await? {
            debug!(instance = %name, record = %record, "Deleted password record");
        }
        delete_if_present(store, &kinds::SECRET, namespace, &record).await?;

        info!(instance = %name, "Deleted expired instance");
    }

    Ok(deleted)
}

pub struct CleanupWorker {
    ctx: Context,
    config: CleanupWorkerConfig,
}

impl CleanupWorker {
    pub fn new(ctx: Context, config: CleanupWorkerConfig) -> Self {
        Self { ctx, config }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting cleanup worker"
        );

        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match cleanup_expired(&self.ctx, Utc::now()).await {
                        Ok(count) => {
                            if count > 0 {
                                info!(deleted = count, "Cleanup pass complete");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to clean up expired instances");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Cleanup worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn instance(name: &str, delete_at: Option<&str>) -> Instance {
        let mut meta = json!({"name": name, "namespace": "ns"});
        if let Some(at) = delete_at {
            meta["annotations"] = json!({"foundry.platform/scheduled-delete-at": at});
        }
        serde_json::from_value(json!({"metadata": meta, "spec": {"licenseRef": {"name": "main"}}}))
            .unwrap()
    }

    #[test]
    fn test_cleanup_worker_config_default() {
        let config = CleanupWorkerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_expired_instances() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let instances = vec![
            instance("kept", None),
            instance("past", Some("2026-03-01T11:00:00Z")),
            instance("naive-past", Some("2026-03-01T11:59:59")),
            instance("future", Some("2026-03-02T00:00:00+00:00")),
            instance("garbage", Some("next tuesday")),
        ];

        let expired: Vec<_> = expired_instances(&instances, now)
            .into_iter()
            .map(Instance::name)
            .collect();
        assert_eq!(expired, ["past", "naive-past"]);
    }
}
