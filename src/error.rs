use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoreError>;

#[derive(Debug, Error)]
pub enum ScoreError {
    /// Startup-only. The service must not come up.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("feature store unavailable: {0}")]
    StorageUnavailable(String),

    /// Recoverable. The anomaly gate falls back to recomputing.
    #[error("verdict cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("artifact persistence failed: {0}")]
    Artifact(String),

    #[error("training failed: {0}")]
    Training(String),

    /// The batch was abandoned; its blocking task may still be running.
    #[error("scoring batch exceeded {0:?}")]
    BatchTimeout(Duration),

    #[error("scoring batch aborted: {0}")]
    BatchAborted(String),

    #[error("anomaly check failed for {} key(s): {}", .failed.len(), format_failures(.failed))]
    GateFailed { failed: Vec<(String, String)> },
}

fn format_failures(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(key, reason)| format!("{}: {}", key, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Attach a [`ScoreError`] variant to foreign errors at the storage/cache boundary.
pub trait BoundaryErrorExt<T> {
    fn storage_err(self, what: &str) -> Result<T>;
    fn cache_err(self, what: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> BoundaryErrorExt<T> for std::result::Result<T, E> {
    fn storage_err(self, what: &str) -> Result<T> {
        self.map_err(|e| ScoreError::StorageUnavailable(format!("{}: {}", what, e)))
    }

    fn cache_err(self, what: &str) -> Result<T> {
        self.map_err(|e| ScoreError::CacheUnavailable(format!("{}: {}", what, e)))
    }
}
