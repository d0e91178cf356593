//! Scorer + AnomalyGate composition.
//!
//! Raw scores come back in scorer order; each key is then checked against
//! the gate one at a time and anomalous players are zeroed. A failed gate
//! lookup does not stop the remaining keys, but the batch as a whole fails
//! so callers never see a partially validated result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::anomaly_gate::AnomalyGate;
use crate::cache::open_verdict_cache;
use crate::config::Config;
use crate::db::{FeatureStore, SqliteFeatureStore};
use crate::error::{Result, ScoreError};
use crate::model::ModelArtifact;
use crate::scorer::Scorer;
use crate::types::ScoreResult;

pub struct Orchestrator {
    scorer: Scorer,
    gate: AnomalyGate,
}

impl Orchestrator {
    pub fn new(scorer: Scorer, gate: AnomalyGate) -> Self {
        Self { scorer, gate }
    }

    /// Open the store and cache and load the artifact pair. Any failure here
    /// is fatal, whether or not a batch follows.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_millis(config.database.timeout_ms);

        let artifact = ModelArtifact::load(&config.artifacts.model_path, &config.artifacts.scaler_path)?;
        let store: Arc<dyn FeatureStore> = Arc::new(SqliteFeatureStore::open(
            config.database.sqlite_path(),
            config.database.pool_size,
            timeout,
        )?);
        let cache = open_verdict_cache(&config.cache, timeout)?;

        let scorer = Scorer::from_artifact(store.clone(), artifact);
        info!("🎯 Scorer ready (model {})", scorer.version());
        Ok(Self::new(scorer, AnomalyGate::new(store, cache)))
    }

    pub fn gate(&self) -> &AnomalyGate {
        &self.gate
    }

    pub fn compute_validated_scores(&self, keys: &[String]) -> Result<Vec<ScoreResult>> {
        let started = Instant::now();
        let raw = self.scorer.score(keys)?;

        let mut validated = Vec::with_capacity(raw.len());
        let mut failed: Vec<(String, String)> = Vec::new();
        let mut suppressed = 0usize;

        for score in raw {
            match self.gate.is_anomalous(&score.player_key) {
                Ok(true) => {
                    suppressed += 1;
                    validated.push(score.zeroed());
                }
                Ok(false) => validated.push(score),
                Err(e) => {
                    warn!("❌ Anomaly check failed for {}: {}", score.player_key, e);
                    failed.push((score.player_key, e.to_string()));
                }
            }
        }

        if !failed.is_empty() {
            return Err(ScoreError::GateFailed { failed });
        }

        info!(
            "✅ Validated {} scores ({} suppressed) in {:?}",
            validated.len(),
            suppressed,
            started.elapsed()
        );
        Ok(validated)
    }

    /// Run one batch on a blocking thread and give up after `deadline`. The
    /// runtime is shut down without joining, so a stuck storage call cannot
    /// hold the caller past the deadline.
    pub fn compute_with_deadline(
        self: Arc<Self>,
        keys: Vec<String>,
        deadline: Duration,
    ) -> Result<Vec<ScoreResult>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ScoreError::BatchAborted(format!("runtime: {}", e)))?;

        let outcome = runtime.block_on(async move {
            let batch = tokio::task::spawn_blocking(move || self.compute_validated_scores(&keys));
            tokio::time::timeout(deadline, batch).await
        });
        runtime.shutdown_background();

        match outcome {
            Ok(Ok(scores)) => scores,
            Ok(Err(e)) => Err(ScoreError::BatchAborted(e.to_string())),
            Err(_) => {
                error!("❌ Batch exceeded {:?} deadline", deadline);
                Err(ScoreError::BatchTimeout(deadline))
            }
        }
    }
}
