//! License controller
//!
//! Reconciles exclusive License holders and the routing that follows from
//! them, and manages admin password secrets.
//!
//! ## Workers
//!
//! - **License**: arbitrates each License's holder and regenerates its routes
//! - **Instance**: applies password regeneration intents, monitors occupancy
//! - **Password**: materializes secrets and delivers new values
//! - **Cleanup**: removes Instances whose scheduled deletion has passed

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fvtt_controller::cleanup::{CleanupWorker, CleanupWorkerConfig};
use fvtt_controller::config::Config;
use fvtt_controller::instances::InstanceWorker;
use fvtt_controller::license::LicenseWorker;
use fvtt_controller::notify::{LogNotifier, PasswordNotifier, WebhookNotifier};
use fvtt_controller::password::PasswordWorker;
use fvtt_controller::prober::HttpOccupancyProber;
use fvtt_controller::Context;
use fvtt_reconcile::Arbiter;
use fvtt_store::{HttpStore, ResourceStore};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting license controller");
    info!(
        namespace = %config.namespace,
        api_server = %config.api_server,
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        probe_timeout_secs = config.probe_timeout.as_secs(),
        "Configuration loaded"
    );

    let store: Arc<dyn ResourceStore> = Arc::new(HttpStore::new(config.store_config()?)?);

    let prober = HttpOccupancyProber::new(config.probe_timeout)?
        .with_store(Arc::clone(&store))
        .with_key_file(&config.admin_key_file);

    let ctx = Context::new(Arc::clone(&store), Arc::new(prober), &config.namespace)
        .with_arbiter(Arbiter::new(config.probe_timeout))
        .with_routes(config.route_config());

    let notifier: Arc<dyn PasswordNotifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url)?),
        None => {
            warn!("FVTT_NOTIFY_WEBHOOK_URL not set; passwords will only be logged as ready");
            Arc::new(LogNotifier)
        }
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let license_worker = LicenseWorker::new(ctx.clone(), config.reconcile_interval);
    let license_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { license_worker.run(shutdown_rx).await }
    });

    let instance_worker = InstanceWorker::new(
        ctx.clone(),
        config.reconcile_interval,
        config.monitor_interval,
    );
    let instance_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { instance_worker.run(shutdown_rx).await }
    });

    let password_worker = PasswordWorker::new(ctx.clone(), notifier, config.password_interval);
    let password_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { password_worker.run(shutdown_rx).await }
    });

    let cleanup_worker = CleanupWorker::new(
        ctx,
        CleanupWorkerConfig {
            interval: config.cleanup_interval,
        },
    );
    let cleanup_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { cleanup_worker.run(shutdown_rx).await }
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    // Signal shutdown to all workers
    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let workers = async {
        let _ = tokio::join!(license_handle, instance_handle, password_handle, cleanup_handle);
    };
    if tokio::time::timeout(Duration::from_secs(10), workers)
        .await
        .is_err()
    {
        warn!("Workers did not stop in time");
    }

    info!("License controller shutdown complete");
    Ok(())
}
