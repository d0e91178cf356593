use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoreError};
use crate::types::{FeatureVector, FEATURE_COUNT};

/// Per-feature standardization: `(value - mean) / std`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParameters {
    pub mean: [f64; FEATURE_COUNT],
    pub std: [f64; FEATURE_COUNT],
}

impl ScalerParameters {
    pub fn new(mean: [f64; FEATURE_COUNT], std: [f64; FEATURE_COUNT]) -> Self {
        Self { mean, std }
    }

    /// Population mean/std per column. Constant columns get std 1.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        if rows.is_empty() {
            return Err(ScoreError::Training("cannot fit scaler on zero rows".to_string()));
        }
        let n = rows.len() as f64;

        let mut mean = [0.0; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.0.iter()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut std = [0.0; FEATURE_COUNT];
        for row in rows {
            for i in 0..FEATURE_COUNT {
                let d = row.0[i] - mean[i];
                std[i] += d * d;
            }
        }
        for s in std.iter_mut() {
            *s = guard_scale((*s / n).sqrt());
        }

        Ok(Self { mean, std })
    }

    pub fn transform(&self, features: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (features.0[i] - self.mean[i]) / guard_scale(self.std[i]);
        }
        FeatureVector(out)
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

/// Zero or non-finite std would make the normalized value undefined.
fn guard_scale(std: f64) -> f64 {
    if std.is_finite() && std > f64::EPSILON {
        std
    } else {
        1.0
    }
}
