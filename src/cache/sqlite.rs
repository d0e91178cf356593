use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{decode_verdict, encode_verdict, VerdictCache};
use crate::error::{BoundaryErrorExt, Result, ScoreError};

/// Verdict cache persisted in a SQLite file, shared across processes.
pub struct SqliteVerdictCache {
    conn: Mutex<Connection>,
}

impl SqliteVerdictCache {
    pub fn new<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ScoreError::Configuration(format!("cache directory: {}", e)))?;
            }
        }

        let conn = Connection::open(path.as_ref())
            .map_err(|e| ScoreError::Configuration(format!("open verdict cache: {}", e)))?;
        conn.busy_timeout(timeout)
            .map_err(|e| ScoreError::Configuration(format!("verdict cache timeout: {}", e)))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS verdict_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| ScoreError::Configuration(format!("verdict cache schema: {}", e)))?;

        let cache = Self { conn: Mutex::new(conn) };
        let purged = cache.purge_expired()?;
        if purged > 0 {
            debug!("Purged {} expired verdicts", purged);
        }
        Ok(cache)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScoreError::CacheUnavailable("cache connection poisoned".to_string()))
    }

    /// Delete rows past their expiry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = now_millis();
        self.lock()?
            .execute("DELETE FROM verdict_cache WHERE expires_at <= ?1", params![now])
            .cache_err("purge verdicts")
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl VerdictCache for SqliteVerdictCache {
    fn get(&self, key: &str) -> Result<Option<bool>> {
        let raw: Option<String> = self
            .lock()?
            .query_row(
                "SELECT value FROM verdict_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, now_millis()],
                |row| row.get(0),
            )
            .optional()
            .cache_err("read verdict")?;

        raw.as_deref().map(decode_verdict).transpose()
    }

    fn set_with_expiry(&self, key: &str, verdict: bool, ttl_secs: u64) -> Result<()> {
        let ttl_millis = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_millis);
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO verdict_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, encode_verdict(verdict), expires_at],
            )
            .cache_err("write verdict")?;
        Ok(())
    }
}
