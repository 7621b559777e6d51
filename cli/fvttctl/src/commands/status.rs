//! Status command (licenses and their holders).

use anyhow::Result;
use clap::Args;
use fvtt_crd::{License, RouteState};
use fvtt_store::{kinds, list_as};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, OutputFormat};

use super::CommandContext;

/// Status command - show every license.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only show this license.
    license: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct LicenseRow {
    #[tabled(rename = "License")]
    name: String,

    #[tabled(rename = "Mode")]
    switch_mode: String,

    #[tabled(rename = "Desired", display = "display_option")]
    desired: Option<String>,

    #[tabled(rename = "Active", display = "display_option")]
    active: Option<String>,

    #[tabled(rename = "Standby")]
    standby: usize,

    #[tabled(rename = "Warning", display = "display_option")]
    warning: Option<String>,
}

fn display_option(opt: &Option<String>) -> String {
    opt.as_deref().unwrap_or("-").to_string()
}

impl From<&License> for LicenseRow {
    fn from(license: &License) -> Self {
        let standby = license
            .status
            .as_ref()
            .map(|s| {
                s.registered_instances
                    .iter()
                    .filter(|i| i.state == RouteState::Standby)
                    .count()
            })
            .unwrap_or(0);

        Self {
            name: license.name().to_string(),
            switch_mode: license.spec.switch_mode.to_string(),
            desired: license.desired_holder().map(str::to_string),
            active: license.current_holder().map(str::to_string),
            standby,
            warning: license.warning().map(str::to_string),
        }
    }
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let licenses: Vec<License> =
            list_as(ctx.store(), &kinds::LICENSE, &ctx.namespace, None).await?;

        let rows: Vec<LicenseRow> = licenses
            .iter()
            .filter(|l| self.license.as_deref().is_none_or(|name| l.name() == name))
            .map(LicenseRow::from)
            .collect();

        print_output(&rows, ctx.format);
        if ctx.format == OutputFormat::Table && rows.iter().any(|r| r.warning.is_some()) {
            eprintln!();
            eprintln!("A warning means the last requested switch was not applied.");
        }
        Ok(())
    }
}
