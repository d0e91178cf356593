//! 🎯 Online scoring
//!
//! records → feature vector → scaler → forest → truncated integer score.
//! Output follows the row order the feature store returns.

use std::sync::Arc;

use tracing::debug;

use crate::db::FeatureStore;
use crate::error::Result;
use crate::model::{ModelArtifact, Regressor, ScalerParameters};
use crate::types::{ScoreResult, TradingRecord};

pub struct Scorer {
    store: Arc<dyn FeatureStore>,
    scaler: ScalerParameters,
    model: Arc<dyn Regressor>,
    version: String,
}

impl Scorer {
    pub fn new(
        store: Arc<dyn FeatureStore>,
        scaler: ScalerParameters,
        model: Arc<dyn Regressor>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            scaler,
            model,
            version: version.into(),
        }
    }

    pub fn from_artifact(store: Arc<dyn FeatureStore>, artifact: ModelArtifact) -> Self {
        let ModelArtifact { version, scaler, model } = artifact;
        Self::new(store, scaler, Arc::new(model), version)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Score every stored row for `keys`. When storage has nothing for any of
    /// the keys, every requested key scores 0 in input order.
    pub fn score(&self, keys: &[String]) -> Result<Vec<ScoreResult>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.store.fetch_records(keys)?;
        if records.is_empty() {
            debug!("No trading records for {} keys, scoring all as 0", keys.len());
            return Ok(keys.iter().map(|key| ScoreResult::new(key.clone(), 0)).collect());
        }

        let scores: Vec<ScoreResult> = records.iter().map(|record| self.score_record(record)).collect();
        debug!("Scored {} records for {} keys (model {})", scores.len(), keys.len(), self.version);
        Ok(scores)
    }

    pub fn score_record(&self, record: &TradingRecord) -> ScoreResult {
        let normalized = self.scaler.transform(&record.features());
        let estimate = self.model.predict(&normalized);
        ScoreResult::new(record.player_key.clone(), truncate_score(estimate))
    }
}

/// Truncate toward zero. NaN scores 0; infinities saturate.
pub fn truncate_score(estimate: f64) -> i64 {
    estimate as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoreError;
    use crate::test_support::{keys, record, FakeStore, FixedModel};
    use crate::types::{FeatureVector, TrainingRow};
    use std::sync::atomic::Ordering;

    /// Model that echoes the first normalized feature, to check scaling
    struct FirstFeature;

    impl Regressor for FirstFeature {
        fn predict(&self, features: &FeatureVector) -> f64 {
            features.0[0]
        }
    }

    struct BrokenStore;

    impl FeatureStore for BrokenStore {
        fn fetch_records(&self, _keys: &[String]) -> Result<Vec<TradingRecord>> {
            Err(ScoreError::StorageUnavailable("connection refused".to_string()))
        }

        fn fetch_aggregate_volume(&self, _key: &str) -> Result<f64> {
            Err(ScoreError::StorageUnavailable("connection refused".to_string()))
        }

        fn fetch_training_rows(&self) -> Result<Vec<TrainingRow>> {
            Err(ScoreError::StorageUnavailable("connection refused".to_string()))
        }
    }

    fn unit_scaler() -> ScalerParameters {
        ScalerParameters::new([10.0, 100.0, 100.0, 5.0], [1.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_known_record_truncates_fixed_prediction() {
        let store = Arc::new(FakeStore::with_records(vec![record("p1", 11.0, 101.0, 99.0, 5.0)]));
        let scorer = Scorer::new(store, unit_scaler(), Arc::new(FixedModel(42.7)), "test");

        let normalized = unit_scaler().transform(&record("p1", 11.0, 101.0, 99.0, 5.0).features());
        assert_eq!(normalized.0, [1.0, 1.0, -1.0, 0.0]);

        let scores = scorer.score(&keys(&["p1"])).unwrap();
        assert_eq!(scores, vec![ScoreResult::new("p1", 42)]);
    }

    #[test]
    fn test_no_records_scores_zero_in_input_order() {
        let store = Arc::new(FakeStore::default());
        let scorer = Scorer::new(store, unit_scaler(), Arc::new(FixedModel(99.0)), "test");

        let scores = scorer.score(&keys(&["c", "a", "b", "a"])).unwrap();
        assert_eq!(
            scores,
            vec![
                ScoreResult::new("c", 0),
                ScoreResult::new("a", 0),
                ScoreResult::new("b", 0),
                ScoreResult::new("a", 0),
            ]
        );
    }

    #[test]
    fn test_output_follows_storage_order_and_drops_absent_keys() {
        let store = Arc::new(FakeStore::with_records(vec![
            record("b", 12.0, 0.0, 0.0, 0.0),
            record("a", 13.0, 0.0, 0.0, 0.0),
        ]));
        let scorer = Scorer::new(store, unit_scaler(), Arc::new(FirstFeature), "test");

        let scores = scorer.score(&keys(&["a", "b", "ghost"])).unwrap();
        assert_eq!(scores, vec![ScoreResult::new("b", 2), ScoreResult::new("a", 3)]);
    }

    #[test]
    fn test_negative_estimates_truncate_toward_zero() {
        assert_eq!(truncate_score(-3.9), -3);
        assert_eq!(truncate_score(3.9), 3);
        assert_eq!(truncate_score(f64::NAN), 0);
    }

    #[test]
    fn test_empty_keys_skip_storage() {
        let store = Arc::new(FakeStore::default());
        let scorer = Scorer::new(store.clone(), unit_scaler(), Arc::new(FixedModel(1.0)), "test");
        assert!(scorer.score(&[]).unwrap().is_empty());
        assert_eq!(store.record_fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_storage_failure_propagates() {
        let scorer = Scorer::new(Arc::new(BrokenStore), unit_scaler(), Arc::new(FixedModel(1.0)), "test");
        assert!(matches!(
            scorer.score(&keys(&["p1"])),
            Err(ScoreError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_from_artifact_uses_forest() {
        use crate::model::{RandomForest, RegressionTree};

        let artifact = ModelArtifact::new(
            "v-test",
            unit_scaler(),
            RandomForest::from_trees(vec![RegressionTree::constant(7.9)]),
        );
        let store = Arc::new(FakeStore::with_records(vec![record("p", 0.0, 0.0, 0.0, 0.0)]));
        let scorer = Scorer::from_artifact(store, artifact);
        assert_eq!(scorer.version(), "v-test");
        assert_eq!(scorer.score(&keys(&["p"])).unwrap(), vec![ScoreResult::new("p", 7)]);
    }
}
