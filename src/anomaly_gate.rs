//! 🚨 Anomaly Gate
//!
//! Read-through memoization of the volume rule: a player whose summed buy +
//! sell volume exceeds [`VOLUME_THRESHOLD`] is anomalous and has their score
//! suppressed. Verdicts live in the [`VerdictCache`] for [`VERDICT_TTL_SECS`].
//!
//! The cache is an optimization only. Read failures count as misses and
//! write failures are logged; only feature store failures surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::VerdictCache;
use crate::db::FeatureStore;
use crate::error::Result;

/// Strictly greater than this is anomalous
pub const VOLUME_THRESHOLD: f64 = 100_000.0;

pub const VERDICT_TTL_SECS: u64 = 3600;

/// Counters for monitoring cache effectiveness
#[derive(Debug, Default)]
pub struct GateStats {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_read_errors: AtomicU64,
    pub cache_write_errors: AtomicU64,
    pub anomalies: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_read_errors: u64,
    pub cache_write_errors: u64,
    pub anomalies: u64,
}

impl GateStats {
    pub fn snapshot(&self) -> GateStatsSnapshot {
        GateStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_read_errors: self.cache_read_errors.load(Ordering::Relaxed),
            cache_write_errors: self.cache_write_errors.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
        }
    }
}

pub struct AnomalyGate {
    store: Arc<dyn FeatureStore>,
    cache: Arc<dyn VerdictCache>,
    stats: GateStats,
}

impl AnomalyGate {
    pub fn new(store: Arc<dyn FeatureStore>, cache: Arc<dyn VerdictCache>) -> Self {
        Self {
            store,
            cache,
            stats: GateStats::default(),
        }
    }

    pub fn stats(&self) -> GateStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_anomalous(&self, key: &str) -> Result<bool> {
        match self.cache.get(key) {
            Ok(Some(verdict)) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Verdict cache hit for {}: {}", key, verdict);
                return Ok(verdict);
            }
            Ok(None) => {
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.cache_read_errors.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️  Verdict cache read failed for {}, recomputing: {}", key, e);
            }
        }

        let volume = self.store.fetch_aggregate_volume(key)?;
        let verdict = exceeds_threshold(volume);
        if verdict {
            self.stats.anomalies.fetch_add(1, Ordering::Relaxed);
            debug!("🚨 {} anomalous: aggregate volume {:.2}", key, volume);
        }

        if let Err(e) = self.cache.set_with_expiry(key, verdict, VERDICT_TTL_SECS) {
            self.stats.cache_write_errors.fetch_add(1, Ordering::Relaxed);
            warn!("⚠️  Verdict cache write failed for {}: {}", key, e);
        }

        Ok(verdict)
    }
}

pub fn exceeds_threshold(volume: f64) -> bool {
    volume > VOLUME_THRESHOLD
}
