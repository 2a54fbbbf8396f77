//! Daemon orchestration: configuration resolution, runtime connection,
//! and the watch / one-shot run modes.
//!
//! # Lifecycle
//!
//! 1. Resolve configuration (defaults, file, `SCOUR_*` env vars, CLI flags)
//! 2. Connect to the container runtime
//! 3. Either run a single sweep (`--once`, `--dry-run`) or hand control to
//!    the janitor watcher until a shutdown signal arrives

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use scour_core::ScourError;
use scour_core::config::ScourConfig;
use scour_janitor::{
    BollardRuntime, ContainerRuntime, JanitorError, RemovalPolicy, RemovalReport, Sweeper,
    run_cleanup,
};

use crate::cli::{DEFAULT_CONFIG_PATH, DaemonCli};

/// Load configuration the way the daemon does on startup.
///
/// An explicit `--config` must exist. Without it, the default path is
/// tried and built-in defaults are used when the file is missing.
/// CLI overrides are applied last and the result is validated again.
pub async fn resolve_config(cli: &DaemonCli) -> Result<ScourConfig> {
    let mut config = match &cli.config {
        Some(path) => ScourConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", path.display(), e))?,
        None => ScourConfig::load_or_default(Path::new(DEFAULT_CONFIG_PATH))
            .await
            .map_err(|e| {
                anyhow::anyhow!("failed to load config {}: {}", DEFAULT_CONFIG_PATH, e)
            })?,
    };

    apply_cli_overrides(&mut config, cli);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    Ok(config)
}

/// Apply command-line overrides on top of file and environment values.
pub fn apply_cli_overrides(config: &mut ScourConfig, cli: &DaemonCli) {
    if let Some(level) = &cli.log_level {
        config.general.log_level.clone_from(level);
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format.clone_from(format);
    }
}

/// Owns the runtime handle and policy for one daemon process.
pub struct Orchestrator<R: ContainerRuntime> {
    runtime: Arc<R>,
    policy: RemovalPolicy,
}

impl Orchestrator<BollardRuntime> {
    /// Connect to the Docker daemon described by `config.docker`.
    pub async fn connect(config: &ScourConfig) -> Result<Self> {
        let runtime = BollardRuntime::from_config(&config.docker)
            .map_err(|e| janitor_failure("failed to create docker client", e))?;
        runtime
            .ping()
            .await
            .map_err(|e| janitor_failure("docker daemon is not reachable", e))?;

        tracing::info!(socket = %config.docker.socket, "connected to docker daemon");
        Ok(Self::new(Arc::new(runtime), RemovalPolicy::from_core(config)))
    }
}

impl<R: ContainerRuntime> Orchestrator<R> {
    pub fn new(runtime: Arc<R>, policy: RemovalPolicy) -> Self {
        Self { runtime, policy }
    }

    /// Watch until `cancel` fires or a fatal error occurs.
    ///
    /// Cancellation is a clean shutdown and maps to `Ok(())`.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        match run_cleanup(cancel, self.runtime, self.policy).await {
            Ok(()) | Err(JanitorError::Cancelled) => {
                tracing::info!("janitor stopped");
                Ok(())
            }
            Err(e) => Err(janitor_failure("janitor terminated", e)),
        }
    }

    /// Run one container sweep followed by one image sweep.
    pub async fn run_once(self, cancel: CancellationToken) -> Result<OnceSummary> {
        let sweeper = Sweeper::new(Arc::clone(&self.runtime), Arc::new(self.policy), cancel);
        let result = sweep_once(&sweeper).await;
        close_runtime(self.runtime.as_ref()).await;
        result
    }

    /// List removal candidates and log them without removing anything.
    pub async fn dry_run(self, cancel: CancellationToken) -> Result<DryRunSummary> {
        let sweeper = Sweeper::new(Arc::clone(&self.runtime), Arc::new(self.policy), cancel);
        let result = list_candidates(&sweeper).await;
        close_runtime(self.runtime.as_ref()).await;
        result
    }
}

async fn sweep_once<R: ContainerRuntime>(sweeper: &Sweeper<R>) -> Result<OnceSummary> {
    let containers = sweeper
        .sweep_containers()
        .await
        .map_err(|e| janitor_failure("container sweep failed", e))?;
    let images = sweeper
        .sweep_images()
        .await
        .map_err(|e| janitor_failure("image sweep failed", e))?;

    let summary = OnceSummary::from_reports(&containers, &images);
    containers
        .into_result()
        .map_err(|e| janitor_failure("container removal failed", e))?;
    images
        .into_result()
        .map_err(|e| janitor_failure("image removal failed", e))?;
    Ok(summary)
}

async fn list_candidates<R: ContainerRuntime>(sweeper: &Sweeper<R>) -> Result<DryRunSummary> {
    let containers = sweeper
        .list_removable_containers()
        .await
        .map_err(|e| janitor_failure("failed to list removable containers", e))?;
    let images = sweeper
        .list_removable_images()
        .await
        .map_err(|e| janitor_failure("failed to list removable images", e))?;

    for container in &containers {
        tracing::info!(
            container_id = %container.id,
            image = %container.image,
            status = container.status.as_str(),
            restart_count = container.restart_count,
            "would remove container"
        );
    }
    for image in &images {
        tracing::info!(image_id = %image.id, tags = ?image.tags, "would remove image");
    }

    Ok(DryRunSummary {
        container_ids: containers.into_iter().map(|c| c.id).collect(),
        image_ids: images.into_iter().map(|i| i.id).collect(),
    })
}

/// Lift a janitor error into the workspace error taxonomy and attach context.
///
/// The resulting error downcasts to [`ScourError`].
pub fn janitor_failure(context: &'static str, err: JanitorError) -> anyhow::Error {
    anyhow::Error::new(ScourError::from(err)).context(context)
}

async fn close_runtime<R: ContainerRuntime>(runtime: &R) {
    if let Err(e) = runtime.close().await {
        tracing::warn!(error = %e, "failed to close runtime connection");
    }
}

/// Counts from a `--once` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnceSummary {
    pub containers_removed: usize,
    pub images_removed: usize,
    pub failures: usize,
}

impl OnceSummary {
    fn from_reports(containers: &RemovalReport, images: &RemovalReport) -> Self {
        Self {
            containers_removed: containers.succeeded().len(),
            images_removed: images.succeeded().len(),
            failures: containers.failed().len() + images.failed().len(),
        }
    }
}

/// Candidates found by a `--dry-run` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DryRunSummary {
    pub container_ids: Vec<String>,
    pub image_ids: Vec<String>,
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Cancel `cancel` when a shutdown signal arrives.
pub fn spawn_signal_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "signal handling unavailable, shutting down"),
        }
        cancel.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_overrides_replace_logging_settings() {
        let mut config = ScourConfig::default();
        let cli = DaemonCli::parse_from([
            "scour-daemon",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
        ]);

        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
    }

    #[test]
    fn absent_cli_overrides_keep_config_values() {
        let mut config = ScourConfig::default();
        config.general.log_level = "warn".to_owned();
        let cli = DaemonCli::parse_from(["scour-daemon"]);

        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn janitor_failure_keeps_scour_error_in_chain() {
        use scour_core::RuntimeError;

        let err = janitor_failure(
            "image removal failed",
            JanitorError::RemovalFailed {
                kind: scour_core::EntityKind::Image,
                id: "sha256:1".to_owned(),
                reason: "conflict".to_owned(),
            },
        );

        assert_eq!(err.to_string(), "image removal failed");
        assert!(matches!(
            err.downcast_ref::<ScourError>(),
            Some(ScourError::Runtime(RuntimeError::RemovalFailed { .. }))
        ));
        assert!(format!("{err:#}").contains("sha256:1"));
    }

    #[test]
    fn janitor_failure_maps_config_errors() {
        let err = janitor_failure(
            "janitor terminated",
            JanitorError::Config {
                field: "concurrency_level".to_owned(),
                reason: "must be 1-255".to_owned(),
            },
        );
        assert!(matches!(
            err.downcast_ref::<ScourError>(),
            Some(ScourError::Config(_))
        ));
    }

    #[test]
    fn once_summary_counts_reports() {
        let empty = RemovalReport::default();
        let summary = OnceSummary::from_reports(&empty, &empty);
        assert_eq!(
            summary,
            OnceSummary {
                containers_removed: 0,
                images_removed: 0,
                failures: 0,
            }
        );
    }
}
