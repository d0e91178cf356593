//! 🗄️ Verdict Cache
//!
//! Memoizes anomaly verdicts per player with an expiry. Values travel as the
//! text "0" / "1"; a missing or expired key is a miss, never an error.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::CacheConfig;
use crate::error::{Result, ScoreError};

pub use memory::MemoryVerdictCache;
pub use sqlite::SqliteVerdictCache;

/// Key/value store for anomaly verdicts.
pub trait VerdictCache: Send + Sync {
    /// `Ok(None)` on miss or expiry.
    fn get(&self, key: &str) -> Result<Option<bool>>;

    fn set_with_expiry(&self, key: &str, verdict: bool, ttl_secs: u64) -> Result<()>;
}

pub fn encode_verdict(verdict: bool) -> &'static str {
    if verdict {
        "1"
    } else {
        "0"
    }
}

/// Any non-zero integer is anomalous.
pub fn decode_verdict(raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<i64>()
        .map(|v| v != 0)
        .map_err(|_| ScoreError::CacheUnavailable(format!("malformed cached verdict: {:?}", raw)))
}

/// Open the cache named by CACHE_URL.
pub fn open_verdict_cache(config: &CacheConfig, timeout: Duration) -> Result<Arc<dyn VerdictCache>> {
    if config.is_memory() {
        info!("🗂️  Verdict cache: in-memory (process-local, verdicts are lost on exit)");
        return Ok(Arc::new(MemoryVerdictCache::new()));
    }
    let cache = SqliteVerdictCache::new(config.sqlite_path(), timeout)?;
    info!("🗂️  Verdict cache: {}", config.sqlite_path().display());
    Ok(Arc::new(cache))
}
