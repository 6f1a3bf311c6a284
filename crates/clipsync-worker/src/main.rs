//! ClipSync binary: one conversion and upload pass over a media library.

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipsync_worker::aggregator::{self, open_log_file};
use clipsync_worker::{LogAggregator, Orchestrator, PipelineConfig, RunSummary, WorkerError, WorkerLogger};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipsync=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);

    // Setup signal handler
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let code = match run(cancel_rx.clone()).await {
        Ok(summary) => {
            info!(
                summary = %serde_json::to_string(&summary).unwrap_or_default(),
                "Finished: {}",
                summary
            );
            0
        }
        Err(e) => {
            error!("{:#}", e);
            if *cancel_rx.borrow() {
                130
            } else {
                e.downcast_ref::<WorkerError>()
                    .map(WorkerError::exit_code)
                    .unwrap_or(1)
            }
        }
    };

    std::process::exit(code);
}

async fn run(cancel_rx: watch::Receiver<bool>) -> anyhow::Result<RunSummary> {
    let cli_root = std::env::args_os().nth(1).map(PathBuf::from);
    let config = PipelineConfig::from_env(cli_root)?;
    info!("Pipeline config: {:?}", config);

    let log_file = open_log_file(&config.log.path, config.log.append).await?;
    let (tx, rx) = aggregator::channel(config.log.channel_capacity);
    let aggregator = tokio::spawn(
        LogAggregator::new(rx, log_file)
            .with_cancel(cancel_rx.clone())
            .run(),
    );

    let logger = WorkerLogger::new("main", tx);
    let orchestrator = Orchestrator::new(config, logger.clone()).with_cancel(cancel_rx);
    let result = orchestrator.run().await;

    // The aggregator may already be gone after a cancellation.
    let _ = logger.shutdown().await;
    drop(orchestrator);
    drop(logger);

    let log_result = aggregator
        .await
        .context("log aggregator task failed")?
        .map(|_| ())
        .context("failed to write run log");

    let summary = result?;
    log_result?;
    Ok(summary)
}
