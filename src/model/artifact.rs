//! 📦 Model artifact persistence
//!
//! The scaler and the forest are stored as two independent bincode blobs.
//! Both carry the version string of the training run that produced them;
//! loading refuses a pair whose versions disagree.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{RandomForest, ScalerParameters};
use crate::error::{Result, ScoreError};

/// Bumped whenever the on-disk layout changes
pub const ARTIFACT_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ScalerBlob {
    format: u32,
    version: String,
    scaler: ScalerParameters,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelBlob {
    format: u32,
    version: String,
    model: RandomForest,
}

/// Immutable output of one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub version: String,
    pub scaler: ScalerParameters,
    pub model: RandomForest,
}

impl ModelArtifact {
    pub fn new(version: impl Into<String>, scaler: ScalerParameters, model: RandomForest) -> Self {
        Self {
            version: version.into(),
            scaler,
            model,
        }
    }

    /// Version id for a fresh training run:
    /// `<utc timestamp, ms>-<random tag>-s<seed>-n<rows>`. The tag keeps two
    /// runs in the same millisecond with identical inputs distinguishable.
    pub fn version_for_run(seed: u64, rows: usize) -> String {
        format!(
            "{}-{:08x}-s{}-n{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            rand::random::<u32>(),
            seed,
            rows
        )
    }

    /// Write both blobs. Temp files first, then rename; any failure removes
    /// the temps and leaves the previous files untouched.
    pub fn save<P: AsRef<Path>>(&self, model_path: P, scaler_path: P) -> Result<()> {
        let model_path = model_path.as_ref();
        let scaler_path = scaler_path.as_ref();

        let scaler_bytes = encode(&ScalerBlob {
            format: ARTIFACT_FORMAT,
            version: self.version.clone(),
            scaler: self.scaler.clone(),
        })?;
        let model_bytes = encode(&ModelBlob {
            format: ARTIFACT_FORMAT,
            version: self.version.clone(),
            model: self.model.clone(),
        })?;

        let scaler_tmp = temp_path(scaler_path);
        let model_tmp = temp_path(model_path);

        let staged = write_staged(&scaler_tmp, &scaler_bytes)
            .and_then(|_| write_staged(&model_tmp, &model_bytes));
        if let Err(e) = staged {
            discard(&[scaler_tmp.as_path(), model_tmp.as_path()]);
            return Err(e);
        }

        if let Err(e) = fs::rename(&scaler_tmp, scaler_path) {
            discard(&[scaler_tmp.as_path(), model_tmp.as_path()]);
            return Err(ScoreError::Artifact(format!("rename {}: {}", scaler_path.display(), e)));
        }
        // A failure here leaves a new scaler next to an old model; the
        // version check on load refuses that pair.
        if let Err(e) = fs::rename(&model_tmp, model_path) {
            discard(&[model_tmp.as_path()]);
            return Err(ScoreError::Artifact(format!("rename {}: {}", model_path.display(), e)));
        }

        info!(
            "💾 Artifact {} saved (model={}, scaler={})",
            self.version,
            model_path.display(),
            scaler_path.display()
        );
        Ok(())
    }

    /// Load and cross-check both blobs. Any failure is a startup configuration error.
    pub fn load<P: AsRef<Path>>(model_path: P, scaler_path: P) -> Result<Self> {
        let scaler: ScalerBlob = decode(scaler_path.as_ref())?;
        let model: ModelBlob = decode(model_path.as_ref())?;

        for (what, format) in [("scaler", scaler.format), ("model", model.format)] {
            if format != ARTIFACT_FORMAT {
                return Err(ScoreError::Configuration(format!(
                    "{} artifact format {} unsupported (expected {})",
                    what, format, ARTIFACT_FORMAT
                )));
            }
        }
        if scaler.version != model.version {
            return Err(ScoreError::Configuration(format!(
                "artifact version mismatch: scaler={} model={}",
                scaler.version, model.version
            )));
        }
        if model.model.is_empty() {
            return Err(ScoreError::Configuration("model artifact has no trees".to_string()));
        }

        info!("✅ Loaded artifact {} ({} trees)", model.version, model.model.len());
        Ok(Self {
            version: model.version,
            scaler: scaler.scaler,
            model: model.model,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ScoreError::Artifact(format!("serialize: {}", e)))
}

fn decode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)
        .map_err(|e| ScoreError::Configuration(format!("read {}: {}", path.display(), e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| ScoreError::Configuration(format!("deserialize {}: {}", path.display(), e)))
}

fn write_staged(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| ScoreError::Artifact(format!("create {}: {}", parent.display(), e)))?;
        }
    }
    fs::write(path, bytes).map_err(|e| ScoreError::Artifact(format!("write {}: {}", path.display(), e)))
}

fn discard(paths: &[&Path]) {
    for path in paths {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove staged artifact {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RegressionTree, Regressor};
    use crate::types::FeatureVector;
    use tempfile::tempdir;

    fn sample_artifact(version: &str) -> ModelArtifact {
        ModelArtifact::new(
            version,
            ScalerParameters::new([1.0, 2.0, 3.0, 4.0], [1.0, 1.0, 2.0, 2.0]),
            RandomForest::from_trees(vec![RegressionTree::constant(12.5)]),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("models/trading_model.bin");
        let scaler = dir.path().join("models/scaler.bin");

        let artifact = sample_artifact("v1");
        artifact.save(&model, &scaler).unwrap();

        let loaded = ModelArtifact::load(&model, &scaler).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.model.predict(&FeatureVector([0.0; 4])), 12.5);
        assert!(!temp_path(&model).exists());
        assert!(!temp_path(&scaler).exists());
    }

    #[test]
    fn test_missing_blob_is_configuration_error() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("model.bin");
        let scaler = dir.path().join("scaler.bin");
        sample_artifact("v1").save(&model, &scaler).unwrap();
        fs::remove_file(&scaler).unwrap();

        assert!(matches!(
            ModelArtifact::load(&model, &scaler),
            Err(ScoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_corrupt_blob_is_configuration_error() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("model.bin");
        let scaler = dir.path().join("scaler.bin");
        sample_artifact("v1").save(&model, &scaler).unwrap();
        fs::write(&model, b"not a forest").unwrap();

        assert!(matches!(
            ModelArtifact::load(&model, &scaler),
            Err(ScoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_mixed_versions_refused() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("model.bin");
        let scaler = dir.path().join("scaler.bin");
        let other_scaler = dir.path().join("other_scaler.bin");
        let other_model = dir.path().join("other_model.bin");

        sample_artifact("v1").save(&model, &scaler).unwrap();
        sample_artifact("v2").save(&other_model, &other_scaler).unwrap();

        match ModelArtifact::load(&model, &other_scaler) {
            Err(ScoreError::Configuration(msg)) => assert!(msg.contains("mismatch")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_failed_write_leaves_no_partial_pair() {
        let dir = tempdir().unwrap();
        let scaler = dir.path().join("scaler.bin");
        // Parent of the model path is a regular file, so staging the model fails
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let model = blocker.join("model.bin");

        let result = sample_artifact("v1").save(&model, &scaler);
        assert!(matches!(result, Err(ScoreError::Artifact(_))));
        assert!(!scaler.exists());
        assert!(!temp_path(&scaler).exists());
    }

    #[test]
    fn test_version_for_run_embeds_seed_and_rows() {
        let version = ModelArtifact::version_for_run(42, 1000);
        assert!(version.ends_with("-s42-n1000"));
    }

    #[test]
    fn test_back_to_back_runs_get_distinct_versions() {
        let a = ModelArtifact::version_for_run(42, 1000);
        let b = ModelArtifact::version_for_run(42, 1000);
        assert_ne!(a, b);
    }

    #[test]
    fn test_interrupted_save_of_same_input_run_is_refused() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("model.bin");
        let scaler = dir.path().join("scaler.bin");
        let staging = dir.path().join("staging");

        // Same seed and row count, saved back to back
        sample_artifact(&ModelArtifact::version_for_run(42, 10)).save(&model, &scaler).unwrap();
        let next = sample_artifact(&ModelArtifact::version_for_run(42, 10));
        next.save(staging.join("model.bin"), staging.join("scaler.bin")).unwrap();

        // Only the scaler of the second run made it into place
        fs::rename(staging.join("scaler.bin"), &scaler).unwrap();

        assert!(matches!(
            ModelArtifact::load(&model, &scaler),
            Err(ScoreError::Configuration(_))
        ));
    }
}
