//! Activate and deactivate commands.

use anyhow::Result;
use clap::Args;
use fvtt_reconcile::ConvergenceStatus;

use crate::intent::{
    activate, activation_status, deactivate, deactivation_status, wait_for_license, IntentOutcome,
};
use crate::output::{print_info, print_receipt, OutputFormat, Receipt};

use super::CommandContext;

/// Activate command - switch a license to an instance.
#[derive(Debug, Args)]
pub struct ActivateCommand {
    /// Instance name.
    instance: String,

    /// Return once the request is accepted instead of waiting for the controller.
    #[arg(long)]
    no_wait: bool,
}

/// Deactivate command - put an instance on standby.
#[derive(Debug, Args)]
pub struct DeactivateCommand {
    /// Instance name.
    instance: String,

    /// Return once the request is accepted instead of waiting for the controller.
    #[arg(long)]
    no_wait: bool,
}

/// Receipt fields for a convergence outcome.
fn describe(
    status: ConvergenceStatus,
    instance: &str,
    license: &str,
    verb: &str,
) -> (&'static str, String) {
    match status {
        ConvergenceStatus::Converged => ("confirmed", format!("{instance} is {verb} on {license}")),
        ConvergenceStatus::Diverged => (
            "diverged",
            format!("The controller did not apply the change to {license}"),
        ),
        ConvergenceStatus::Converging | ConvergenceStatus::Unknown => (
            "pending",
            format!("Request for {instance} accepted, not yet confirmed. Check `fvtt status` in a moment."),
        ),
    }
}

async fn follow_up<S>(
    ctx: &CommandContext,
    kind: &str,
    instance: &str,
    verb: &str,
    outcome: IntentOutcome,
    no_wait: bool,
    status: S,
) -> Result<()>
where
    S: Fn(&fvtt_crd::License) -> ConvergenceStatus,
{
    let license = outcome.license().to_string();

    if let IntentOutcome::Unchanged { .. } = outcome {
        print_receipt(
            ctx.format,
            Receipt {
                kind,
                status: "unchanged",
                message: format!("Nothing to do for {instance} on {license}"),
                warning: None,
            },
        );
        return Ok(());
    }

    if no_wait {
        print_receipt(
            ctx.format,
            Receipt {
                kind,
                status: "accepted",
                message: format!("Request for {instance} submitted to {license}"),
                warning: None,
            },
        );
        return Ok(());
    }

    let wait = ctx.switch_wait();
    if ctx.format == OutputFormat::Table {
        print_info(&format!(
            "Waiting up to {}s for the controller to reconcile {license}...",
            wait.timeout.as_secs()
        ));
    }

    let (converged, last) =
        wait_for_license(ctx.store(), &ctx.namespace, &license, wait, status).await?;
    let (state, message) = describe(converged, instance, &license, verb);

    print_receipt(
        ctx.format,
        Receipt {
            kind,
            status: state,
            message,
            warning: last.as_ref().and_then(|l| l.warning()).map(str::to_string),
        },
    );
    Ok(())
}

impl ActivateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let outcome = activate(ctx.store(), &ctx.namespace, &self.instance).await?;
        let instance = self.instance.as_str();
        follow_up(&ctx, "activate", instance, "active", outcome, self.no_wait, |l| {
            activation_status(l, instance)
        })
        .await
    }
}

impl DeactivateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let outcome = deactivate(ctx.store(), &ctx.namespace, &self.instance).await?;
        let instance = self.instance.as_str();
        follow_up(&ctx, "deactivate", instance, "on standby", outcome, self.no_wait, |l| {
            deactivation_status(l, instance)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_reported_as_accepted() {
        let (state, message) =
            describe(ConvergenceStatus::Converging, "beta", "main", "active");
        assert_eq!(state, "pending");
        assert!(message.contains("accepted, not yet confirmed"));

        let (state, _) = describe(ConvergenceStatus::Converged, "beta", "main", "active");
        assert_eq!(state, "confirmed");
    }
}
