//! Password pass.
//!
//! Materializes each Password record's secret, applies refresh requests, and
//! hands new values to the notifier. The pending-notification flag is raised
//! only by [`reconcile_password`] and cleared only by [`deliver_pending`]
//! after the notifier confirms delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fvtt_crd::{Password, PasswordPhase};
use fvtt_store::{find_as, kinds, list_as};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::context::Context;
use crate::error::ControllerResult;
use crate::notify::{PasswordNotification, PasswordNotifier};
use crate::secrets::{read_secret_value, resolve_secret};

/// What a password reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordOutcome {
    pub created: bool,
    pub regenerated: bool,
    pub status_written: bool,
}

/// A refresh token newer than the last one applied to a materialized record.
fn wants_refresh(record: &Password) -> bool {
    let Some(token) = record.refresh_token() else {
        return false;
    };
    let observed = record
        .status
        .as_ref()
        .and_then(|s| s.observed_refresh_token);
    record.is_materialized() && observed.is_none_or(|o| token > o)
}

#[instrument(skip(ctx, record), fields(record = %record.name()))]
pub async fn reconcile_password(
    ctx: &Context,
    record: &Password,
) -> ControllerResult<PasswordOutcome> {
    let store = ctx.store();
    let namespace = record.namespace();
    let status = record.status.clone().unwrap_or_default();
    let regenerate = wants_refresh(record);

    let resolved = match resolve_secret(store, namespace, record.secret_name(), regenerate).await {
        Ok(resolved) => resolved,
        Err(e) => {
            let failed = json!({"status": {"phase": PasswordPhase::Failed}});
            if let Err(write_err) = store
                .patch_status(&kinds::PASSWORD, namespace, record.name(), &failed)
                .await
            {
                warn!(error = %write_err, "Failed to record password failure");
            }
            return Err(e.into());
        }
    };

    let changed = resolved.created || resolved.notify_pending;
    let now = Utc::now();
    let token = record.refresh_token();
    let observed = match (token, status.observed_refresh_token) {
        (Some(t), Some(o)) => Some(t.max(o)),
        (t, o) => t.or(o),
    };

    let up_to_date = !changed
        && status.phase == Some(PasswordPhase::Ready)
        && status.created_at.is_some()
        && status.last_refreshed.is_some()
        && status.secret_name.as_deref() == Some(record.secret_name())
        && status.observed_refresh_token == observed;

    if up_to_date {
        debug!("Password record up to date");
        return Ok(PasswordOutcome::default());
    }

    let last_refreshed = if changed {
        now
    } else {
        status.last_refreshed.unwrap_or(now)
    };
    let mut patch = json!({
        "status": {
            "phase": PasswordPhase::Ready,
            "secretName": record.secret_name(),
            "createdAt": status.created_at.unwrap_or(now),
            "lastRefreshed": last_refreshed,
            "observedRefreshToken": observed,
        }
    });
    if changed {
        patch["status"]["passwordPendingNotification"] = json!(true);
    }

    store
        .patch_status(&kinds::PASSWORD, namespace, record.name(), &patch)
        .await?;

    if changed {
        info!(
            created = resolved.created,
            regenerated = regenerate,
            "Admin password materialized"
        );
    }

    Ok(PasswordOutcome {
        created: resolved.created,
        regenerated: regenerate && resolved.notify_pending,
        status_written: true,
    })
}

/// Reconcile every Password record. Returns how many were reconciled
/// successfully; failures are logged and retried on the next pass.
pub async fn reconcile_passwords(ctx: &Context) -> ControllerResult<usize> {
    let records: Vec<Password> =
        list_as(ctx.store(), &kinds::PASSWORD, &ctx.namespace, None).await?;

    let mut reconciled = 0;
    for record in &records {
        match reconcile_password(ctx, record).await {
            Ok(_) => reconciled += 1,
            Err(e) => error!(record = %record.name(), error = %e, "Password reconciliation failed"),
        }
    }
    Ok(reconciled)
}

/// Deliver every pending password exactly once per distinct value. Returns
/// the number of notifications sent.
#[instrument(skip(ctx, notifier), fields(namespace = %ctx.namespace))]
pub async fn deliver_pending(
    ctx: &Context,
    notifier: &dyn PasswordNotifier,
) -> ControllerResult<usize> {
    let store = ctx.store();
    let namespace = ctx.namespace.as_str();
    let records: Vec<Password> = list_as(store, &kinds::PASSWORD, namespace, None).await?;

    let mut delivered = 0;
    for record in &records {
        let Some(status) = record.status.as_ref() else {
            continue;
        };
        if !status.password_pending_notification {
            continue;
        }

        // Same value as the last delivery: the flag is stale.
        if status.last_refreshed.is_some() && status.last_refreshed == status.last_notified_refresh
        {
            store
                .patch_status(
                    &kinds::PASSWORD,
                    namespace,
                    record.name(),
                    &json!({"status": {"passwordPendingNotification": false}}),
                )
                .await?;
            debug!(record = %record.name(), "Cleared stale notification flag");
            continue;
        }

        let Some(value) = read_secret_value(store, namespace, record.secret_name()).await? else {
            warn!(record = %record.name(), "Pending password has no value yet");
            continue;
        };

        if let Err(e) = notifier
            .deliver(&PasswordNotification::new(record, value))
            .await
        {
            warn!(record = %record.name(), error = %e, "Password delivery failed; will retry");
            continue;
        }

        // Only clear if no newer value appeared while delivering.
        let latest: Option<Password> =
            find_as(store, &kinds::PASSWORD, namespace, record.name()).await?;
        let refreshed = latest
            .as_ref()
            .and_then(|r| r.status.as_ref())
            .and_then(|s| s.last_refreshed);
        if refreshed != status.last_refreshed {
            debug!(record = %record.name(), "Value changed during delivery; keeping flag");
            continue;
        }

        store
            .patch_status(
                &kinds::PASSWORD,
                namespace,
                record.name(),
                &json!({"status": {
                    "passwordPendingNotification": false,
                    "lastNotifiedRefresh": status.last_refreshed,
                }}),
            )
            .await?;
        info!(record = %record.name(), "Password delivered");
        delivered += 1;
    }

    Ok(delivered)
}

/// Periodically reconciles Password records and delivers pending values.
pub struct PasswordWorker {
    ctx: Context,
    notifier: Arc<dyn PasswordNotifier>,
    interval: Duration,
}

impl PasswordWorker {
    pub fn new(ctx: Context, notifier: Arc<dyn PasswordNotifier>, interval: Duration) -> Self {
        Self {
            ctx,
            notifier,
            interval,
        }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting password worker"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = reconcile_passwords(&self.ctx).await {
                        error!(error = %e, "Password pass failed");
                    }
                    if let Err(e) = deliver_pending(&self.ctx, self.notifier.as_ref()).await {
                        error!(error = %e, "Password delivery pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Password worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
