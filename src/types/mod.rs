use serde::{Deserialize, Serialize};

/// Number of model inputs, in [`FEATURE_NAMES`] order.
pub const FEATURE_COUNT: usize = 4;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "hold_duration",
    "buy_volume",
    "sell_volume",
    "transaction_frequency",
];

/// One `trading_data` row as returned by the scoring query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRecord {
    pub player_key: String,
    pub hold_duration: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub transaction_frequency: f64,
}

impl TradingRecord {
    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            self.hold_duration,
            self.buy_volume,
            self.sell_volume,
            self.transaction_frequency,
        ])
    }
}

/// Fixed-order feature tuple, raw or normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Historical labeled row used for training. NULL columns stay `None`
/// until the trainer fills them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingRow {
    pub hold_duration: Option<f64>,
    pub buy_volume: Option<f64>,
    pub sell_volume: Option<f64>,
    pub transaction_frequency: Option<f64>,
    pub trading_score: Option<f64>,
}

impl TrainingRow {
    /// Features and label with missing values replaced by 0.
    pub fn filled(&self) -> (FeatureVector, f64) {
        let features = FeatureVector([
            self.hold_duration.unwrap_or(0.0),
            self.buy_volume.unwrap_or(0.0),
            self.sell_volume.unwrap_or(0.0),
            self.transaction_frequency.unwrap_or(0.0),
        ]);
        (features, self.trading_score.unwrap_or(0.0))
    }
}

/// Final (player_key, trading_score) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub player_key: String,
    pub trading_score: i64,
}

impl ScoreResult {
    pub fn new(player_key: impl Into<String>, trading_score: i64) -> Self {
        Self {
            player_key: player_key.into(),
            trading_score,
        }
    }

    pub fn zeroed(&self) -> Self {
        Self::new(self.player_key.clone(), 0)
    }
}
