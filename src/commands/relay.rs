use anyhow::{Context, Result};

use flashfeed::config::Config;
use flashfeed::metrics;
use flashfeed::relay::RelayServer;

/// Run the CORS relay until Ctrl+C
pub async fn relay(config: Config) -> Result<()> {
    config.validate_relay()?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Continuing without metrics");
    }

    let server = RelayServer::new(config.relay).context("Failed to build relay server")?;
    server.start_with_shutdown(super::ctrl_c()).await?;

    Ok(())
}
