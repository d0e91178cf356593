//! Learned parameters: feature scaler, regression forest, and the artifact
//! pair that carries them from the trainer to the scorer.

pub mod artifact;
pub mod forest;
pub mod scaler;
pub mod tree;

pub use artifact::ModelArtifact;
pub use forest::RandomForest;
pub use scaler::ScalerParameters;
pub use tree::RegressionTree;

use crate::types::FeatureVector;

/// Maps a normalized feature vector to a continuous score estimate.
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> f64;
}
