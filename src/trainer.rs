//! 🏋️ Offline model training
//!
//! Fits the scaler over every historical row, normalizes, holds out a
//! seeded 20% partition, fits the forest on the rest and reports held-out
//! R². The R² is a diagnostic; it never blocks emitting the artifact.

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::db::FeatureStore;
use crate::error::{Result, ScoreError};
use crate::model::forest::ForestParams;
use crate::model::{ModelArtifact, RandomForest, ScalerParameters};
use crate::types::{FeatureVector, TrainingRow};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingParams {
    /// Seeds both the split and the forest
    pub seed: u64,
    pub n_trees: usize,
    pub max_depth: usize,
    /// Share of rows held out for the R² diagnostic
    pub test_fraction: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            seed: 42,
            n_trees: 200,
            max_depth: 10,
            test_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    /// `None` when the held-out labels are constant or too few
    pub holdout_r2: Option<f64>,
    pub train_rows: usize,
    pub holdout_rows: usize,
}

pub struct Trainer {
    params: TrainingParams,
}

impl Trainer {
    pub fn new(params: TrainingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    pub fn train(&self, rows: &[TrainingRow]) -> Result<TrainingOutcome> {
        if rows.len() < 2 {
            return Err(ScoreError::Training(format!(
                "need at least 2 labeled rows, got {}",
                rows.len()
            )));
        }

        let (features, labels): (Vec<FeatureVector>, Vec<f64>) =
            rows.iter().map(TrainingRow::filled).unzip();

        let scaler = ScalerParameters::fit(&features)?;
        let normalized = scaler.transform_all(&features);

        let (train_idx, test_idx) = train_test_split(rows.len(), self.params.test_fraction, self.params.seed);
        if train_idx.is_empty() {
            return Err(ScoreError::Training("training partition is empty".to_string()));
        }

        let x_train: Vec<FeatureVector> = train_idx.iter().map(|&i| normalized[i]).collect();
        let y_train: Vec<f64> = train_idx.iter().map(|&i| labels[i]).collect();
        let x_test: Vec<FeatureVector> = test_idx.iter().map(|&i| normalized[i]).collect();
        let y_test: Vec<f64> = test_idx.iter().map(|&i| labels[i]).collect();

        info!(
            "🏋️  Fitting forest: {} trees, depth {}, {} train / {} held out",
            self.params.n_trees,
            self.params.max_depth,
            x_train.len(),
            x_test.len()
        );
        let model = RandomForest::fit(
            &x_train,
            &y_train,
            ForestParams {
                n_trees: self.params.n_trees,
                max_depth: self.params.max_depth,
                seed: self.params.seed,
            },
        )?;

        let holdout_r2 = model.r2_score(&x_test, &y_test);
        match holdout_r2 {
            Some(r2) => info!("📈 Model Training Score (held-out R²): {:.4}", r2),
            None => warn!("Held-out R² undefined ({} rows, constant or too few labels)", y_test.len()),
        }

        let version = ModelArtifact::version_for_run(self.params.seed, rows.len());
        Ok(TrainingOutcome {
            artifact: ModelArtifact::new(version, scaler, model),
            holdout_r2,
            train_rows: x_train.len(),
            holdout_rows: x_test.len(),
        })
    }

    /// Full offline job: read the table, fit, and persist both blobs.
    pub fn train_and_persist(
        &self,
        store: &dyn FeatureStore,
        model_path: &Path,
        scaler_path: &Path,
    ) -> Result<TrainingOutcome> {
        let rows = store.fetch_training_rows()?;
        let outcome = self.train(&rows)?;
        outcome.artifact.save(model_path, scaler_path)?;
        info!("✅ Model and scaler saved successfully ({})", outcome.artifact.version);
        Ok(outcome)
    }
}

/// Seeded shuffle, then the first `ceil(n * test_fraction)` indices are held out.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_n = ((n as f64) * test_fraction).ceil() as usize;
    let test_n = test_n.min(n);
    let train = indices.split_off(test_n);
    (train, indices)
}
