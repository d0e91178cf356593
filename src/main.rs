// Trading Score - Scoring Service
// Loads the trained artifact, scores the player keys given on the command
// line and prints the validated scores as JSON

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use trading_score::config::Config;
use trading_score::Orchestrator;

fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(config.logging.json);

    info!("🚀 Trading Score Service Starting...");

    // Store, cache and artifact are validated even when there is nothing to score
    let orchestrator = Arc::new(
        Orchestrator::from_config(&config).context("Failed to start scoring service")?,
    );

    let keys: Vec<String> = std::env::args().skip(1).collect();
    if keys.is_empty() {
        info!("ℹ️  No player keys given, nothing to score");
        println!("[]");
        return Ok(());
    }

    let batch_timeout = Duration::from_secs(config.service.batch_timeout_secs);
    let result = orchestrator.clone().compute_with_deadline(keys, batch_timeout);

    let stats = orchestrator.gate().stats();
    info!(
        "📊 Gate stats: hits={} misses={} read_errors={} write_errors={} anomalies={}",
        stats.cache_hits,
        stats.cache_misses,
        stats.cache_read_errors,
        stats.cache_write_errors,
        stats.anomalies
    );

    let scores = result.context("Failed to compute validated scores")?;
    println!("{}", serde_json::to_string_pretty(&scores)?);
    Ok(())
}

fn init_logging(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the JSON results
    if json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
