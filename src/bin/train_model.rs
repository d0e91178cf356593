// Trading Score - Model Trainer
// Offline job: reads trading_data, fits scaler + forest, writes both artifacts

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use trading_score::config::TrainingConfig;
use trading_score::{SqliteFeatureStore, Trainer};

fn main() -> Result<()> {
    let config = TrainingConfig::from_env().context("Failed to load training configuration")?;
    init_logging(config.logging.json);

    info!("🏋️  Model Trainer Starting...");
    info!(
        "   seed={} trees={} max_depth={} test_fraction={}",
        config.params.seed, config.params.n_trees, config.params.max_depth, config.params.test_fraction
    );

    let store = SqliteFeatureStore::open(
        config.database.sqlite_path(),
        config.database.pool_size,
        Duration::from_millis(config.database.timeout_ms),
    )
    .context("Failed to open feature store")?;
    info!("✅ Feature store: {}", config.database.sqlite_path().display());

    let started = Instant::now();
    let trainer = Trainer::new(config.params);
    let outcome = trainer
        .train_and_persist(&store, &config.artifacts.model_path, &config.artifacts.scaler_path)
        .context("Training run failed")?;

    match outcome.holdout_r2 {
        Some(r2) => info!("📈 Held-out R²: {:.4}", r2),
        None => warn!("⚠️  Held-out R² undefined"),
    }
    info!(
        "✅ Trained {} on {} rows ({} held out) in {:?}",
        outcome.artifact.version,
        outcome.train_rows,
        outcome.holdout_rows,
        started.elapsed()
    );
    Ok(())
}

fn init_logging(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt().json().with_env_filter(env_filter).init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}
