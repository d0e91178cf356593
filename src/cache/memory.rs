use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use super::{decode_verdict, encode_verdict, VerdictCache};
use crate::error::Result;

#[derive(Debug, Clone)]
struct CachedVerdict {
    value: &'static str,
    stored_at: Instant,
    ttl: Duration,
}

impl CachedVerdict {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Expired entries are swept once per this many writes
const SWEEP_EVERY: usize = 1024;

/// Process-local verdict cache. Lock-free reads via DashMap.
#[derive(Default)]
pub struct MemoryVerdictCache {
    entries: DashMap<String, CachedVerdict>,
    writes: AtomicUsize,
}

impl MemoryVerdictCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VerdictCache for MemoryVerdictCache {
    fn get(&self, key: &str) -> Result<Option<bool>> {
        let raw = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => entry.value,
            _ => return Ok(None),
        };
        decode_verdict(raw).map(Some)
    }

    fn set_with_expiry(&self, key: &str, verdict: bool, ttl_secs: u64) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            CachedVerdict {
                value: encode_verdict(verdict),
                stored_at: Instant::now(),
                ttl: Duration::from_secs(ttl_secs),
            },
        );

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            let removed = self.cleanup_expired();
            debug!("Swept {} expired verdicts", removed);
        }
        Ok(())
    }
}
