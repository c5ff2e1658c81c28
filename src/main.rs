use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flashfeed::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "flashfeed",
    version,
    about = "Flash event feed ingester with endpoint failover and paced replay",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults to FLASHFEED_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed and replay new events until interrupted
    Watch {
        #[command(flatten)]
        source: SourceArgs,

        /// Base polling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Maximum random delay added to each poll, in milliseconds
        #[arg(long)]
        jitter_ms: Option<u64>,

        /// Serve /status and /metrics on this address
        #[arg(long)]
        status_addr: Option<SocketAddr>,
    },

    /// Fetch one batch with failover and print it as JSON
    Once {
        #[command(flatten)]
        source: SourceArgs,

        /// Pretty-print the JSON output
        #[arg(long, default_value = "false")]
        pretty: bool,
    },

    /// Run the CORS relay server
    Relay {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Endpoint overrides shared by `watch` and `once`
#[derive(clap::Args)]
struct SourceArgs {
    /// Primary endpoint URL
    #[arg(long)]
    primary_url: Option<String>,

    /// Secondary endpoint URL
    #[arg(long)]
    secondary_url: Option<String>,

    /// Do not send browser-like headers (for a trusted local relay)
    #[arg(long, default_value = "false")]
    no_browser_headers: bool,
}

impl SourceArgs {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.primary_url {
            config.source.primary_url = url;
        }
        if let Some(url) = self.secondary_url {
            config.source.secondary_url = url;
        }
        if self.no_browser_headers {
            config.source.browser_headers = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize tracing/logging
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    tracing::info!("flashfeed starting");

    match cli.command {
        Commands::Watch {
            source,
            interval_ms,
            jitter_ms,
            status_addr,
        } => {
            source.apply(&mut config);
            if let Some(ms) = interval_ms {
                config.pacing.base_poll_interval_ms = ms;
            }
            if let Some(ms) = jitter_ms {
                config.pacing.poll_jitter_ms = ms;
            }
            config.validate()?;

            tracing::info!(status_addr = ?status_addr, "Starting watch command");
            commands::watch(config, status_addr).await?;
        }

        Commands::Once { source, pretty } => {
            source.apply(&mut config);
            config.validate()?;

            tracing::info!("Starting once command");
            commands::once(config, pretty).await?;
        }

        Commands::Relay { host, port } => {
            if let Some(host) = host {
                config.relay.host = host;
            }
            if let Some(port) = port {
                config.relay.port = port;
            }

            tracing::info!(
                host = %config.relay.host,
                port = config.relay.port,
                "Starting relay command"
            );
            commands::relay(config).await?;
        }
    }

    tracing::info!("flashfeed stopped");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("flashfeed=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("flashfeed={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
