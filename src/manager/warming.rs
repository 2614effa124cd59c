//! Cache warming.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::CacheLevel;
use crate::error::Result;
use crate::keys::CacheContext;
use crate::manager::{CacheIdentity, CacheManager};

const DEFAULT_WARM_LIMIT: usize = 100;

/// Which entries to pre-populate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum WarmStrategy {
    MostAccessed,
    RecentlyUpdated,
    Explicit { ids: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmCriteria {
    #[serde(flatten)]
    pub strategy: WarmStrategy,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub context: CacheContext,
}

impl WarmCriteria {
    pub fn new(strategy: WarmStrategy) -> Self {
        Self {
            strategy,
            limit: DEFAULT_WARM_LIMIT,
            context: CacheContext::default(),
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

fn default_limit() -> usize {
    DEFAULT_WARM_LIMIT
}

/// A value ready to be cached under its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmItem {
    pub identity: CacheIdentity,
    pub value: Value,
}

/// Supplies the values to warm. Implemented by whoever owns the data.
#[async_trait]
pub trait WarmSource: Send + Sync {
    async fn items(&self, criteria: &WarmCriteria) -> Result<Vec<WarmItem>>;
}

/// Outcome of a warming run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub entity: usize,
    pub query: usize,
    pub aggregate: usize,
    pub service: usize,
    pub failed: usize,
    /// Latency saved if every warmed entry is hit once
    pub estimated_latency_improvement_ms: u64,
}

impl WarmReport {
    pub fn warmed(&self) -> usize {
        self.entity + self.query + self.aggregate + self.service
    }

    fn count(&mut self, level: CacheLevel) {
        match level {
            CacheLevel::Entity => self.entity += 1,
            CacheLevel::Query => self.query += 1,
            CacheLevel::Aggregate => self.aggregate += 1,
            CacheLevel::Service => self.service += 1,
        }
        self.estimated_latency_improvement_ms += level.estimated_saving_ms();
    }
}

impl CacheManager {
    // == Warm Cache ==
    /// Pre-populates the cache with what `source` selects for `criteria`.
    ///
    /// Writes are synchronous so the report reflects what actually landed.
    pub async fn warm_cache(&self, source: &dyn WarmSource, criteria: &WarmCriteria) -> WarmReport {
        let mut report = WarmReport::default();

        let items = match source.items(criteria).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    strategy = ?criteria.strategy,
                    error = %e,
                    "Warm source failed, nothing warmed"
                );
                return report;
            }
        };

        for item in items.into_iter().take(criteria.limit) {
            let level = item.identity.level();
            let key = item.identity.key(&self.keys).to_string();
            let ttl = self.keys.ttl_for(&key, Some(level), &criteria.context);

            match self.store.set(&key, item.value, Duration::from_secs(ttl)).await {
                Ok(true) => {
                    self.stats.record_write(level);
                    report.count(level);
                }
                Ok(false) => {
                    self.stats.record_error(level);
                    report.failed += 1;
                }
                Err(e) => {
                    self.stats.record_error(level);
                    report.failed += 1;
                    warn!(key = %key, error = %e, "Warm write failed");
                }
            }
        }

        info!(
            strategy = ?criteria.strategy,
            warmed = report.warmed(),
            failed = report.failed,
            estimated_ms = report.estimated_latency_improvement_ms,
            "Cache warming finished"
        );
        report
    }
}
