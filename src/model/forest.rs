//! 🌲 Random forest regressor
//!
//! Bagged ensemble of [`RegressionTree`]s. Each tree sees its own bootstrap
//! sample drawn from an RNG derived from the forest seed and the tree index,
//! so a given (data, seed) pair always produces the same forest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RegressionTree, Regressor};
use crate::error::{Result, ScoreError};
use crate::types::FeatureVector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn from_trees(trees: Vec<RegressionTree>) -> Self {
        Self { trees }
    }

    pub fn fit(x: &[FeatureVector], y: &[f64], params: ForestParams) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ScoreError::Training(format!(
                "forest needs matching non-empty inputs (x={}, y={})",
                x.len(),
                y.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(ScoreError::Training("forest needs at least one tree".to_string()));
        }

        let n = x.len();
        let trees = (0..params.n_trees)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(params.seed, t));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &sample, params.max_depth)
            })
            .collect::<Vec<_>>();

        debug!("🌲 Fitted {} trees on {} rows", trees.len(), n);
        Ok(Self { trees })
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Coefficient of determination on a labeled set.
    /// `None` with fewer than two rows or constant labels.
    pub fn r2_score(&self, x: &[FeatureVector], y: &[f64]) -> Option<f64> {
        r2_score(y, &x.iter().map(|row| self.predict(row)).collect::<Vec<_>>())
    }
}

impl Regressor for RandomForest {
    fn predict(&self, features: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|tree| tree.predict(features)).sum::<f64>() / self.trees.len() as f64
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(tree as u64)
}

pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> Option<f64> {
    if y_true.len() < 2 || y_true.len() != y_pred.len() {
        return None;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        return None;
    }
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    Some(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Vec<FeatureVector>, Vec<f64>) {
        let x: Vec<FeatureVector> = (0..n)
            .map(|i| {
                let a = i as f64;
                FeatureVector([a, (i % 7) as f64, (i % 3) as f64, 1.0])
            })
            .collect();
        let y = x.iter().map(|f| 2.0 * f.0[0] + 5.0).collect();
        (x, y)
    }

    #[test]
    fn test_fit_is_reproducible() {
        let (x, y) = linear_data(50);
        let params = ForestParams { n_trees: 10, max_depth: 5, seed: 7 };
        let a = RandomForest::fit(&x, &y, params).unwrap();
        let b = RandomForest::fit(&x, &y, params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let (x, y) = linear_data(50);
        let a = RandomForest::fit(&x, &y, ForestParams { n_trees: 5, max_depth: 5, seed: 1 }).unwrap();
        let b = RandomForest::fit(&x, &y, ForestParams { n_trees: 5, max_depth: 5, seed: 2 }).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fits_linear_signal() {
        let (x, y) = linear_data(100);
        let forest = RandomForest::fit(&x, &y, ForestParams { n_trees: 20, max_depth: 8, seed: 42 }).unwrap();
        assert_eq!(forest.len(), 20);
        let r2 = forest.r2_score(&x, &y).unwrap();
        assert!(r2 > 0.9, "r2 = {}", r2);
    }

    #[test]
    fn test_prediction_is_tree_average() {
        let forest = RandomForest::from_trees(vec![
            RegressionTree::constant(10.0),
            RegressionTree::constant(20.0),
        ]);
        assert_eq!(forest.predict(&FeatureVector([0.0; 4])), 15.0);
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let (x, _) = linear_data(5);
        assert!(RandomForest::fit(&x, &[1.0], ForestParams::default()).is_err());
        assert!(RandomForest::fit(&[], &[], ForestParams::default()).is_err());
    }

    #[test]
    fn test_r2_score_edges() {
        assert_eq!(r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), Some(1.0));
        assert_eq!(r2_score(&[1.0], &[1.0]), None);
        assert_eq!(r2_score(&[4.0, 4.0], &[1.0, 2.0]), None);
        assert_eq!(r2_score(&[1.0, 3.0], &[2.0, 2.0]), Some(0.0));
    }
}
