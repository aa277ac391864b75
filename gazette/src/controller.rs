use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use anyhow::Context;
use gazette_common::{
    Signal,
    audit::{self, AuditConfig},
    internal, logging,
};
use gazette_delivery::{DeliveryExecutor, DeliveryProcessor, DeliveryScheduler};
use gazette_spool::{JobSpool, SpoolConfig};
use gazette_store::{RecordStore, StoreConfig};
use gazette_transport::{Transport, TransportConfig};
use ron::extensions::Extensions;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::newsroom::Newsroom;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "GAZETTE_CONFIG";

/// Top-level configuration and process controller.
///
/// ```ron
/// Gazette(
///     store: Sqlite(path: "/var/lib/gazette/gazette.db"),
///     spool: File(path: "/var/spool/gazette"),
///     transport: Smtp(host: "smtp.example.com", from: "news@example.com"),
///     delivery: (poll_interval_secs: 5),
///     audit: (redact_recipients: true),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Gazette {
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    spool: SpoolConfig,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    delivery: DeliveryProcessor,
    #[serde(default)]
    audit: AuditConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `GAZETTE_CONFIG` environment variable
/// 2. ./gazette.config.ron (current working directory)
/// 3. /etc/gazette/gazette.config.ron (system-wide config)
///
/// # Errors
/// If `GAZETTE_CONFIG` names a missing file, or no candidate exists.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./gazette.config.ron"),
        PathBuf::from("/etc/gazette/gazette.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

impl Gazette {
    /// Parse a RON configuration.
    ///
    /// Newtype variants may omit their inner parentheses, so
    /// `Smtp(host: "...")` reads the same as `Smtp((host: "..."))`.
    pub fn from_ron(input: &str) -> anyhow::Result<Self> {
        Ok(ron::Options::default()
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES)
            .from_str(input)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_ron(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    #[must_use]
    pub const fn delivery(&self) -> &DeliveryProcessor {
        &self.delivery
    }

    #[must_use]
    pub const fn transport_config(&self) -> &TransportConfig {
        &self.transport
    }

    pub async fn open_store(&self) -> anyhow::Result<Arc<dyn RecordStore>> {
        self.store
            .clone()
            .into_record_store()
            .await
            .context("Failed to open the record store")
    }

    pub async fn open_spool(&self) -> anyhow::Result<Arc<dyn JobSpool>> {
        self.spool
            .clone()
            .into_job_spool()
            .await
            .context("Failed to open the job spool")
    }

    pub fn build_transport(&self) -> anyhow::Result<Arc<dyn Transport>> {
        self.transport
            .clone()
            .into_transport()
            .context("Failed to build the transport")
    }

    /// Store and spool wired into a [`Newsroom`].
    pub async fn newsroom(&self) -> anyhow::Result<Newsroom> {
        let store = self.open_store().await?;
        let spool = self.open_spool().await?;
        Ok(Newsroom::new(store, DeliveryScheduler::new(spool)))
    }

    /// An executor with the configured delivery settings.
    pub fn executor(&self, store: Arc<dyn RecordStore>) -> anyhow::Result<DeliveryExecutor> {
        Ok(DeliveryExecutor::new(store, self.build_transport()?)
            .with_settings(self.delivery.executor_settings()))
    }

    /// Run the delivery processor until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// This function will return an error if the store, spool or transport
    /// cannot be opened.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();
        audit::init(self.audit.clone());

        let store = self.open_store().await?;
        let spool = self.open_spool().await?;
        let transport = self.build_transport()?;

        internal!("Controller running with the {} transport", transport.name());
        if !transport.is_configured() {
            warn!(
                transport = transport.name(),
                "Transport is not configured; deliveries will fail until it is"
            );
        }

        self.delivery.init(store, spool, transport);

        let ret = tokio::select! {
            r = self.delivery.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}
