//! Intents submitted by the requesting side, and their convergence.
//!
//! An intent is a single merge patch against the store. Whether it took
//! effect is decided later by the license controller, so callers follow up
//! with [`wait_for_license`] or [`wait_for_refresh`].

use chrono::Utc;
use fvtt_crd::{annotations, Instance, License, Password, PasswordPhase};
use fvtt_reconcile::{wait_for, ConvergenceStatus, WaitConfig};
use fvtt_store::{find_as, get_as, kinds, ResourceStore};
use serde_json::json;
use tracing::debug;

use crate::error::CliError;

/// What an activation or deactivation intent did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    /// The License spec was patched.
    Submitted {
        license: String,
        previous: Option<String>,
    },
    /// The License already expressed this intent.
    Unchanged { license: String },
}

impl IntentOutcome {
    pub fn license(&self) -> &str {
        match self {
            Self::Submitted { license, .. } | Self::Unchanged { license } => license,
        }
    }
}

async fn instance_and_license(
    store: &dyn ResourceStore,
    namespace: &str,
    instance: &str,
) -> Result<(Instance, License), CliError> {
    let record: Instance = find_as(store, &kinds::INSTANCE, namespace, instance)
        .await?
        .ok_or_else(|| CliError::NotFound(format!("Instance '{instance}'")))?;

    let license_name = record.license_name().to_string();
    let license: License = find_as(store, &kinds::LICENSE, namespace, &license_name)
        .await?
        .ok_or_else(|| CliError::NotFound(format!("License '{license_name}'")))?;

    Ok((record, license))
}

/// Ask for `instance` to become the holder of its License.
pub async fn activate(
    store: &dyn ResourceStore,
    namespace: &str,
    instance: &str,
) -> Result<IntentOutcome, CliError> {
    let (_, license) = instance_and_license(store, namespace, instance).await?;
    let license_name = license.name().to_string();

    if license.desired_holder() == Some(instance) {
        return Ok(IntentOutcome::Unchanged {
            license: license_name,
        });
    }

    store
        .patch(
            &kinds::LICENSE,
            namespace,
            &license_name,
            &json!({"spec": {"activeInstanceName": instance}}),
        )
        .await
        .map_err(|e| CliError::from_store(e, format!("License '{license_name}'")))?;

    debug!(license = %license_name, instance = %instance, "Activation submitted");
    Ok(IntentOutcome::Submitted {
        license: license_name,
        previous: license.desired_holder().map(str::to_string),
    })
}

/// Ask for `instance` to stop holding its License.
pub async fn deactivate(
    store: &dyn ResourceStore,
    namespace: &str,
    instance: &str,
) -> Result<IntentOutcome, CliError> {
    let (_, license) = instance_and_license(store, namespace, instance).await?;
    let license_name = license.name().to_string();

    if license.desired_holder() != Some(instance) {
        return Ok(IntentOutcome::Unchanged {
            license: license_name,
        });
    }

    store
        .patch(
            &kinds::LICENSE,
            namespace,
            &license_name,
            &json!({"spec": {"activeInstanceName": null}}),
        )
        .await
        .map_err(|e| CliError::from_store(e, format!("License '{license_name}'")))?;

    debug!(license = %license_name, instance = %instance, "Deactivation submitted");
    Ok(IntentOutcome::Submitted {
        license: license_name,
        previous: Some(instance.to_string()),
    })
}

/// Stamp a password record with a fresh refresh token. Returns the token.
pub async fn request_password_refresh(
    store: &dyn ResourceStore,
    namespace: &str,
    record: &str,
) -> Result<u64, CliError> {
    let token = Utc::now().timestamp().max(0) as u64;

    store
        .patch(
            &kinds::PASSWORD,
            namespace,
            record,
            &json!({"metadata": {"annotations": {(annotations::FORCE_SYNC): token.to_string()}}}),
        )
        .await
        .map_err(|e| CliError::from_store(e, format!("Password record '{record}'")))?;

    Ok(token)
}

/// How far a License is towards `instance` being its holder.
pub fn activation_status(license: &License, instance: &str) -> ConvergenceStatus {
    if license.current_holder() == Some(instance) {
        ConvergenceStatus::Converged
    } else if license.desired_holder() != Some(instance) || warning_names(license, instance) {
        ConvergenceStatus::Diverged
    } else {
        ConvergenceStatus::Converging
    }
}

/// How far a License is towards `instance` no longer holding it.
pub fn deactivation_status(license: &License, instance: &str) -> ConvergenceStatus {
    if license.current_holder() != Some(instance) {
        ConvergenceStatus::Converged
    } else if license.desired_holder() == Some(instance) {
        ConvergenceStatus::Diverged
    } else {
        ConvergenceStatus::Converging
    }
}

fn warning_names(license: &License, instance: &str) -> bool {
    license
        .warning()
        .is_some_and(|w| w.contains(&format!("'{instance}'")))
}

/// Poll a License until `status` reports convergence or the budget runs out.
///
/// On timeout the License is read once more so the caller can tell a denied
/// switch from one that is merely slow.
pub async fn wait_for_license<S>(
    store: &dyn ResourceStore,
    namespace: &str,
    license: &str,
    config: WaitConfig,
    status: S,
) -> Result<(ConvergenceStatus, Option<License>), CliError>
where
    S: Fn(&License) -> ConvergenceStatus,
{
    let fetch = || async move {
        find_as::<License>(store, &kinds::LICENSE, namespace, license)
            .await
            .ok()
            .flatten()
    };

    if let Some(record) = wait_for(fetch, |l| status(l).is_converged(), config).await {
        return Ok((ConvergenceStatus::Converged, Some(record)));
    }

    let last: Option<License> = find_as(store, &kinds::LICENSE, namespace, license).await?;
    let outcome = match &last {
        Some(record) => match status(record) {
            ConvergenceStatus::Diverged => ConvergenceStatus::Diverged,
            ConvergenceStatus::Converged => ConvergenceStatus::Converged,
            _ => ConvergenceStatus::Converging,
        },
        None => ConvergenceStatus::Unknown,
    };
    Ok((outcome, last))
}

/// Whether a password record has applied the refresh token `token`.
pub fn refresh_status(record: &Password, token: u64) -> ConvergenceStatus {
    let Some(status) = &record.status else {
        return ConvergenceStatus::Converging;
    };
    match status.phase {
        Some(PasswordPhase::Failed) => ConvergenceStatus::Diverged,
        Some(PasswordPhase::Ready) if status.observed_refresh_token >= Some(token) => {
            ConvergenceStatus::Converged
        }
        _ => ConvergenceStatus::Converging,
    }
}

/// Poll a password record until it reports the refresh as applied.
pub async fn wait_for_refresh(
    store: &dyn ResourceStore,
    namespace: &str,
    record: &str,
    token: u64,
    config: WaitConfig,
) -> Result<ConvergenceStatus, CliError> {
    let fetch = || async move {
        find_as::<Password>(store, &kinds::PASSWORD, namespace, record)
            .await
            .ok()
            .flatten()
    };

    let stop = |p: &Password| !refresh_status(p, token).is_converging();
    match wait_for(fetch, stop, config).await {
        Some(found) => Ok(refresh_status(&found, token)),
        None => {
            let last: Password = get_as(store, &kinds::PASSWORD, namespace, record)
                .await
                .map_err(|e| CliError::from_store(e, format!("Password record '{record}'")))?;
            Ok(refresh_status(&last, token))
        }
    }
}
