//! Cache metrics and tuning recommendations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheLevel, CacheStats};
use crate::manager::CacheManager;

/// Hit rate above which a level should keep entries longer.
pub const HIGH_HIT_RATE_THRESHOLD: f64 = 0.8;

/// Hit rate below which a level is not paying for itself.
pub const LOW_HIT_RATE_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    IncreaseTtl,
    DisableLevel,
}

impl Recommendation {
    /// Recommendation for a level's counters; `None` when it saw no reads.
    pub fn for_stats(stats: &CacheStats) -> Option<Self> {
        if stats.reads() == 0 {
            return None;
        }
        let hit_rate = stats.hit_rate();
        if hit_rate > HIGH_HIT_RATE_THRESHOLD {
            Some(Recommendation::IncreaseTtl)
        } else if hit_rate < LOW_HIT_RATE_THRESHOLD {
            Some(Recommendation::DisableLevel)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelMetrics {
    #[serde(flatten)]
    pub counters: CacheStats,
    pub hit_rate: f64,
    pub recommendation: Option<Recommendation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub levels: BTreeMap<CacheLevel, LevelMetrics>,
    pub overall_hit_rate: f64,
    pub store_available: bool,
    pub write_behind_pending: usize,
    pub generated_at: DateTime<Utc>,
}

impl CacheManager {
    // == Metrics ==
    /// Per-level counters, hit rates and recommendations.
    pub async fn get_cache_metrics(&self) -> CacheMetrics {
        let snapshot = self.stats.snapshot();

        let (hits, reads) = snapshot
            .values()
            .fold((0u64, 0u64), |(h, r), s| (h + s.hits, r + s.reads()));
        let overall_hit_rate = if reads == 0 {
            0.0
        } else {
            hits as f64 / reads as f64
        };

        let levels = snapshot
            .into_iter()
            .map(|(level, counters)| {
                let metrics = LevelMetrics {
                    hit_rate: counters.hit_rate(),
                    recommendation: Recommendation::for_stats(&counters),
                    counters,
                };
                (level, metrics)
            })
            .collect();

        CacheMetrics {
            levels,
            overall_hit_rate,
            store_available: self.store.is_available().await,
            write_behind_pending: self
                .write_behind
                .as_ref()
                .map(|queue| queue.pending())
                .unwrap_or(0),
            generated_at: Utc::now(),
        }
    }
}
