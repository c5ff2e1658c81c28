use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::sync::watch as watch_channel;

use flashfeed::config::Config;
use flashfeed::metrics;
use flashfeed::pipeline::IngestionLoop;
use flashfeed::sink::LogSink;
use flashfeed::status;

/// Run the ingestion loop until Ctrl+C
pub async fn watch(config: Config, status_addr: Option<SocketAddr>) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Continuing without metrics");
    }

    let ingestion = IngestionLoop::from_config(&config, LogSink::new())
        .context("Failed to build ingestion loop")?;
    let (shutdown_tx, shutdown_rx) = watch_channel::channel(false);

    let status_task = status_addr.map(|addr| {
        let status_rx = ingestion.status();
        let mut stop_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let stopped = async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = status::serve(addr, status_rx, stopped).await {
                tracing::error!(error = %e, "Status endpoint failed");
            }
        })
    });

    tokio::spawn(async move {
        super::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(
        primary = %config.source.primary_url,
        secondary = %config.source.secondary_url,
        interval_ms = config.pacing.base_poll_interval_ms,
        "Watching feed"
    );

    ingestion.run(shutdown_rx).await?;

    if let Some(task) = status_task {
        let _ = task.await;
    }

    Ok(())
}
