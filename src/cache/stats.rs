//! Cache Statistics Module
//!
//! Tracks per-level hits, misses, writes, invalidations and swallowed errors.
//! Every manager owns its own [`StatsCollector`]; nothing here is global.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::cache::CacheLevel;

// == Cache Stats ==
/// Counters for a single cache level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from the cache
    pub hits: u64,
    /// Reads that fell through to the compute function
    pub misses: u64,
    /// Successful stores
    pub writes: u64,
    /// Keys or patterns purged at this level
    pub invalidations: u64,
    /// Store or serialization failures that were bypassed
    pub errors: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.reads();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total reads seen by this level.
    pub fn reads(&self) -> u64 {
        self.hits + self.misses
    }
}

// == Stats Collector ==
/// Instance-scoped collector of per-level counters.
#[derive(Debug, Default)]
pub struct StatsCollector {
    levels: Mutex<BTreeMap<CacheLevel, CacheStats>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, level: CacheLevel) {
        self.with_level(level, |s| s.hits += 1);
    }

    pub fn record_miss(&self, level: CacheLevel) {
        self.with_level(level, |s| s.misses += 1);
    }

    pub fn record_write(&self, level: CacheLevel) {
        self.with_level(level, |s| s.writes += 1);
    }

    pub fn record_invalidation(&self, level: CacheLevel, count: u64) {
        self.with_level(level, |s| s.invalidations += count);
    }

    pub fn record_error(&self, level: CacheLevel) {
        self.with_level(level, |s| s.errors += 1);
    }

    /// Counters for one level.
    pub fn level(&self, level: CacheLevel) -> CacheStats {
        self.lock().get(&level).cloned().unwrap_or_default()
    }

    /// Counters for every level, zero-filled for levels never touched.
    pub fn snapshot(&self) -> BTreeMap<CacheLevel, CacheStats> {
        let levels = self.lock();
        CacheLevel::ALL
            .into_iter()
            .map(|level| (level, levels.get(&level).cloned().unwrap_or_default()))
            .collect()
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn with_level(&self, level: CacheLevel, f: impl FnOnce(&mut CacheStats)) {
        f(self.lock().entry(level).or_default());
    }

    // A poisoned lock only means a counter update panicked; the counts are still usable.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<CacheLevel, CacheStats>> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner())
    }
}
