//! Reset-password command.

use anyhow::Result;
use clap::Args;
use fvtt_crd::names;
use fvtt_reconcile::{ConvergenceStatus, WaitConfig};

use crate::intent::{request_password_refresh, wait_for_refresh};
use crate::output::{print_info, print_receipt, OutputFormat, Receipt};

use super::CommandContext;

/// Reset-password command - request a fresh admin password.
///
/// The new value is delivered to its owner by the controller's notifier,
/// never printed here.
#[derive(Debug, Args)]
pub struct ResetPasswordCommand {
    /// Instance whose dedicated password to reset.
    #[arg(required_unless_present = "owner", conflicts_with = "owner")]
    instance: Option<String>,

    /// Reset the shared default password of this owner ID instead.
    #[arg(long)]
    owner: Option<String>,

    /// Return once the request is accepted.
    #[arg(long)]
    no_wait: bool,
}

impl ResetPasswordCommand {
    fn record_name(&self) -> String {
        match (&self.instance, &self.owner) {
            (Some(instance), _) => names::instance_password_name(instance),
            (None, Some(owner)) => names::default_password_name(owner),
            (None, None) => String::new(),
        }
    }

    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let record = self.record_name();
        let token = request_password_refresh(ctx.store(), &ctx.namespace, &record).await?;

        let mut receipt = Receipt {
            kind: "reset-password",
            status: "accepted",
            message: format!("Refresh of {record} requested"),
            warning: None,
        };

        if !self.no_wait {
            let wait = ctx.wait_config(WaitConfig::default());
            if ctx.format == OutputFormat::Table {
                print_info(&format!(
                    "Waiting up to {}s for {record} to be regenerated...",
                    wait.timeout.as_secs()
                ));
            }

            match wait_for_refresh(ctx.store(), &ctx.namespace, &record, token, wait).await? {
                ConvergenceStatus::Converged => {
                    receipt.status = "confirmed";
                    receipt.message =
                        format!("{record} regenerated; the new password will be sent to its owner");
                }
                ConvergenceStatus::Diverged => {
                    receipt.status = "diverged";
                    receipt.message = format!("{record} failed to regenerate");
                }
                ConvergenceStatus::Converging | ConvergenceStatus::Unknown => {
                    receipt.status = "pending";
                    receipt.message = format!("Refresh of {record} accepted, not yet confirmed");
                }
            }
        }

        print_receipt(ctx.format, receipt);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(instance: Option<&str>, owner: Option<&str>) -> ResetPasswordCommand {
        ResetPasswordCommand {
            instance: instance.map(str::to_string),
            owner: owner.map(str::to_string),
            no_wait: true,
        }
    }

    #[test]
    fn test_record_name() {
        assert_eq!(
            command(Some("alpha"), None).record_name(),
            "foundry-password-alpha"
        );
        assert_eq!(
            command(None, Some("1234")).record_name(),
            names::default_password_name("1234")
        );
    }
}
