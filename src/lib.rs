// Trading Score - Scoring Pipeline
// Model-based player scoring with a cached anomaly override, plus the offline trainer

pub mod config;
pub mod error;
pub mod types;
pub mod db;
pub mod cache;
pub mod model;
pub mod trainer;
pub mod scorer;
pub mod anomaly_gate;
pub mod orchestrator;

pub use anomaly_gate::AnomalyGate;
pub use cache::VerdictCache;
pub use db::{FeatureStore, SqliteFeatureStore};
pub use error::{ScoreError, BoundaryErrorExt};
pub use model::ModelArtifact;
pub use orchestrator::Orchestrator;
pub use scorer::Scorer;
pub use trainer::Trainer;

#[cfg(test)]
mod test_support;
