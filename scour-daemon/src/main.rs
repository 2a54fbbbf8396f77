use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use scour_daemon::cli::DaemonCli;
use scour_daemon::orchestrator::{self, Orchestrator};
use scour_daemon::{logging, metrics_server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let config = orchestrator::resolve_config(&cli).await?;

    if cli.validate {
        println!("configuration is valid");
        return Ok(());
    }

    // 로깅 초기화
    logging::init_tracing(&config.general)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "scour-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let cancel = CancellationToken::new();
    let signal_task = orchestrator::spawn_signal_handler(cancel.clone());

    let orchestrator = Orchestrator::connect(&config).await?;

    let result = if cli.dry_run {
        orchestrator.dry_run(cancel).await.map(|summary| {
            tracing::info!(
                containers = summary.container_ids.len(),
                images = summary.image_ids.len(),
                "dry run complete"
            );
        })
    } else if cli.once {
        orchestrator.run_once(cancel).await.map(|summary| {
            tracing::info!(
                containers_removed = summary.containers_removed,
                images_removed = summary.images_removed,
                "single sweep complete"
            );
        })
    } else {
        orchestrator.run(cancel).await
    };

    signal_task.abort();

    if let Err(e) = &result {
        tracing::error!(error = format!("{e:#}"), "scour-daemon exiting with error");
    } else {
        tracing::info!("scour-daemon shut down");
    }
    result
}
