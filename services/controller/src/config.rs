//! Configuration for the license controller.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fvtt_store::HttpStoreConfig;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding Licenses, Instances and Password records.
    pub namespace: String,

    /// Resource store API URL.
    pub api_server: String,

    /// File holding the bearer token for the store.
    pub token_file: PathBuf,

    /// Extra CA bundle for the store's TLS certificate.
    pub ca_file: Option<PathBuf>,

    /// Fallback admin key used to query instance occupancy.
    pub admin_key_file: PathBuf,

    pub reconcile_interval: Duration,
    pub password_interval: Duration,
    pub monitor_interval: Duration,
    pub cleanup_interval: Duration,
    pub probe_timeout: Duration,

    /// Service serving the standby page.
    pub standby_service: String,
    pub standby_namespace: Option<String>,

    /// Where password notifications are posted. Logged only when unset.
    pub notify_webhook_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// A positive number of seconds from `key`, or `default` when unset or
/// unparseable. Zero is rejected.
fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    let secs = std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default);
    if secs.is_zero() {
        bail!("{key} must be greater than zero");
    }
    Ok(secs)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let namespace = std::env::var("FVTT_NAMESPACE")
            .unwrap_or_else(|_| fvtt_crd::DEFAULT_NAMESPACE.to_string());

        let api_server = std::env::var("FVTT_API_SERVER")
            .unwrap_or_else(|_| "https://kubernetes.default.svc".to_string());

        let token_file = env_opt("FVTT_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_DIR).join("token"));

        let ca_file = env_opt("FVTT_CA_FILE").map(PathBuf::from).or_else(|| {
            let default = PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt");
            default.exists().then_some(default)
        });

        let admin_key_file = env_opt("FVTT_ADMIN_KEY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/etc/foundry/credentials/adminPassword"));

        let log_level = std::env::var("FVTT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            namespace,
            api_server,
            token_file,
            ca_file,
            admin_key_file,
            reconcile_interval: env_secs(
                "FVTT_RECONCILE_INTERVAL_SECS",
                fvtt_reconcile::DEFAULT_RECONCILE_INTERVAL,
            )?,
            password_interval: env_secs("FVTT_PASSWORD_INTERVAL_SECS", Duration::from_secs(15))?,
            monitor_interval: env_secs("FVTT_MONITOR_INTERVAL_SECS", Duration::from_secs(60))?,
            cleanup_interval: env_secs("FVTT_CLEANUP_INTERVAL_SECS", Duration::from_secs(3600))?,
            probe_timeout: env_secs(
                "FVTT_PROBE_TIMEOUT_SECS",
                fvtt_reconcile::DEFAULT_PROBE_TIMEOUT,
            )?,
            standby_service: std::env::var("FVTT_STANDBY_SERVICE")
                .unwrap_or_else(|_| "foundry-standby-page".to_string()),
            standby_namespace: env_opt("FVTT_STANDBY_NAMESPACE"),
            notify_webhook_url: env_opt("FVTT_NOTIFY_WEBHOOK_URL"),
            log_level,
        })
    }

    /// Store connection settings, reading the token and CA files.
    pub fn store_config(&self) -> Result<HttpStoreConfig> {
        let mut config = HttpStoreConfig::new(&self.api_server);

        // Running outside the cluster without a token is allowed (e.g. a proxy).
        config.token = std::fs::read_to_string(&self.token_file)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if let Some(ca_file) = &self.ca_file {
            let pem = std::fs::read(ca_file)
                .with_context(|| format!("failed to read CA file {}", ca_file.display()))?;
            config.ca_cert_pem = Some(pem);
        }

        Ok(config)
    }

    pub fn route_config(&self) -> fvtt_reconcile::RouteConfig {
        fvtt_reconcile::RouteConfig {
            standby_service: self.standby_service.clone(),
            standby_namespace: self.standby_namespace.clone(),
            ..Default::default()
        }
    }
}
