//! Fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::db::FeatureStore;
use crate::error::{Result, ScoreError};
use crate::model::Regressor;
use crate::types::{FeatureVector, TradingRecord, TrainingRow};

/// Model that ignores its input
pub struct FixedModel(pub f64);

impl Regressor for FixedModel {
    fn predict(&self, _features: &FeatureVector) -> f64 {
        self.0
    }
}

/// In-memory feature store that counts round trips
#[derive(Default)]
pub struct FakeStore {
    pub records: Vec<TradingRecord>,
    pub volumes: Mutex<HashMap<String, f64>>,
    pub fail_volume_for: Vec<String>,
    pub record_fetches: AtomicUsize,
    pub volume_fetches: AtomicUsize,
}

impl FakeStore {
    pub fn with_records(records: Vec<TradingRecord>) -> Self {
        Self { records, ..Self::default() }
    }

    pub fn set_volume(&self, key: &str, volume: f64) {
        self.volumes.lock().unwrap().insert(key.to_string(), volume);
    }
}

impl FeatureStore for FakeStore {
    fn fetch_records(&self, keys: &[String]) -> Result<Vec<TradingRecord>> {
        self.record_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .iter()
            .filter(|r| keys.contains(&r.player_key))
            .cloned()
            .collect())
    }

    fn fetch_aggregate_volume(&self, key: &str) -> Result<f64> {
        self.volume_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_volume_for.iter().any(|k| k == key) {
            return Err(ScoreError::StorageUnavailable(format!("volume query timed out for {}", key)));
        }
        Ok(self.volumes.lock().unwrap().get(key).copied().unwrap_or(0.0))
    }

    fn fetch_training_rows(&self) -> Result<Vec<TrainingRow>> {
        Ok(Vec::new())
    }
}

pub fn record(key: &str, hold: f64, buy: f64, sell: f64, freq: f64) -> TradingRecord {
    TradingRecord {
        player_key: key.to_string(),
        hold_duration: hold,
        buy_volume: buy,
        sell_volume: sell,
        transaction_frequency: freq,
    }
}

pub fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
