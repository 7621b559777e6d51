//! CLI commands.

mod instances;
mod password;
mod status;
mod switch;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fvtt_reconcile::{WaitConfig, ACTIVATION_WAIT};
use fvtt_store::{HttpStore, HttpStoreConfig, ResourceStore};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// Foundry VTT license CLI - switch which instance holds a license.
#[derive(Debug, Parser)]
#[command(name = "fvtt")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Namespace holding licenses and instances.
    #[arg(long, global = true, env = "FVTT_NAMESPACE", default_value = fvtt_crd::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Resource store API server.
    #[arg(
        long,
        global = true,
        env = "FVTT_API_SERVER",
        default_value = "https://kubernetes.default.svc"
    )]
    api_server: String,

    /// Bearer token for the API server.
    #[arg(long, global = true, env = "FVTT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seconds to wait for the controller to confirm a change.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Seconds between confirmation checks.
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Log store requests to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show every license with its desired and active instance.
    Status(status::StatusCommand),

    /// List instances and their occupancy.
    Instances(instances::InstancesCommand),

    /// Make an instance the active holder of its license.
    Activate(switch::ActivateCommand),

    /// Put an instance back on standby.
    Deactivate(switch::DeactivateCommand),

    /// Request a new admin password.
    ResetPassword(password::ResetPasswordCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Install a stderr subscriber when `-v` is given.
    pub fn init_tracing(&self) {
        if !self.verbose {
            return;
        }
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        if let Commands::Version = self.command {
            println!("fvtt {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let mut store_config = HttpStoreConfig::new(&self.api_server);
        store_config.token = self.token.clone();
        let store = HttpStore::new(store_config)
            .with_context(|| format!("Failed to configure store client for {}", self.api_server))?;

        let ctx = CommandContext {
            store: Arc::new(store),
            format: self.format,
            namespace: self.namespace,
            timeout: self.timeout.map(Duration::from_secs),
            interval: self.interval.map(Duration::from_secs),
        };

        match self.command {
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::Instances(cmd) => cmd.run(ctx).await,
            Commands::Activate(cmd) => cmd.run(ctx).await,
            Commands::Deactivate(cmd) => cmd.run(ctx).await,
            Commands::ResetPassword(cmd) => cmd.run(ctx).await,
            Commands::Version => Ok(()),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub store: Arc<dyn ResourceStore>,
    pub format: OutputFormat,
    pub namespace: String,
    timeout: Option<Duration>,
    interval: Option<Duration>,
}

impl CommandContext {
    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    /// Wait budget, with `--timeout`/`--interval` overriding `base`.
    pub fn wait_config(&self, base: WaitConfig) -> WaitConfig {
        WaitConfig {
            timeout: self.timeout.unwrap_or(base.timeout),
            interval: self.interval.unwrap_or(base.interval),
        }
    }

    pub fn switch_wait(&self) -> WaitConfig {
        self.wait_config(ACTIVATION_WAIT)
    }
}
