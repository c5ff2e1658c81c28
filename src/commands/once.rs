use anyhow::{Context, Result};
use serde::Serialize;

use flashfeed::config::Config;
use flashfeed::models::{Endpoint, Event};
use flashfeed::source::FailoverFetcher;

/// Output of a single fetch
#[derive(Debug, Serialize)]
struct OnceOutput {
    endpoint: Endpoint,
    total_events: Option<u64>,
    total_actors: Option<u64>,
    events: Vec<Event>,
}

/// Run one failover fetch and print the batch as JSON
pub async fn once(config: Config, pretty: bool) -> Result<()> {
    let mut fetcher =
        FailoverFetcher::from_config(&config).context("Failed to build fetcher")?;

    let fetched = fetcher.fetch_once().await?;
    let stats = fetched.batch.stats().ok();

    let output = OnceOutput {
        endpoint: fetched.endpoint,
        total_events: stats.map(|s| s.total_events),
        total_actors: stats.map(|s| s.total_actors),
        events: fetched.batch.events,
    };

    let json = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");

    Ok(())
}
