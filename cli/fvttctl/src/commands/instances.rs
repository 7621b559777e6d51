//! Instances command.

use anyhow::Result;
use clap::Args;
use fvtt_crd::{Instance, License};
use fvtt_store::{kinds, list_as};
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::CommandContext;

/// Instances command - list instances with routing and occupancy.
#[derive(Debug, Args)]
pub struct InstancesCommand {
    /// Only show instances bound to this license.
    #[arg(long)]
    license: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct InstanceRow {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "License")]
    license: String,

    #[tabled(rename = "Route")]
    route: String,

    #[tabled(rename = "Players", display = "display_players")]
    connected_players: Option<i64>,

    #[tabled(rename = "World", display = "display_option")]
    active_world: Option<String>,

    #[tabled(rename = "Delete At", display = "display_option")]
    scheduled_delete_at: Option<String>,

    #[tabled(rename = "Probe Error", display = "display_option")]
    probe_error: Option<String>,
}

fn display_option(opt: &Option<String>) -> String {
    opt.as_deref().unwrap_or("-").to_string()
}

fn display_players(opt: &Option<i64>) -> String {
    opt.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn row(instance: &Instance, licenses: &[License]) -> InstanceRow {
    let route = licenses
        .iter()
        .find(|l| l.name() == instance.license_name())
        .and_then(|l| l.status.as_ref())
        .and_then(|s| {
            s.registered_instances
                .iter()
                .find(|r| r.name == instance.name())
        })
        .map(|r| r.state.to_string())
        .unwrap_or_else(|| "unregistered".to_string());

    let status = instance.status.clone().unwrap_or_default();
    InstanceRow {
        name: instance.name().to_string(),
        license: instance.license_name().to_string(),
        route,
        connected_players: status.connected_players,
        active_world: status.active_world,
        scheduled_delete_at: instance
            .metadata
            .annotation(fvtt_crd::annotations::SCHEDULED_DELETE_AT)
            .map(str::to_string),
        probe_error: status.probe_error,
    }
}

impl InstancesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let store = ctx.store();
        let instances: Vec<Instance> =
            list_as(store, &kinds::INSTANCE, &ctx.namespace, None).await?;
        let licenses: Vec<License> = list_as(store, &kinds::LICENSE, &ctx.namespace, None).await?;

        let rows: Vec<InstanceRow> = instances
            .iter()
            .filter(|i| {
                self.license
                    .as_deref()
                    .is_none_or(|name| i.license_name() == name)
            })
            .map(|i| row(i, &licenses))
            .collect();

        print_output(&rows, ctx.format);
        Ok(())
    }
}
