//! Invalidation Statistics
//!
//! Counters kept by one invalidator instance.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The most recent invalidation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastInvalidation {
    /// entity, query, aggregate, event, bulk or all
    pub kind: String,
    /// What was invalidated: an id, an event name, a pattern count
    pub target: String,
    pub success: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationStats {
    /// Successful single-entity invalidations
    pub entity_invalidations: u64,
    /// Query patterns purged
    pub query_invalidations: u64,
    /// Aggregate patterns purged
    pub aggregate_invalidations: u64,
    /// Keys physically removed by pattern purges
    pub keys_deleted: u64,
    /// Mapped events dispatched
    pub events_processed: u64,
    /// Event names with no mapping
    pub unknown_events: u64,
    pub bulk_operations: u64,
    pub full_purges: u64,
    /// Patterns refused before reaching the store
    pub rejected_patterns: u64,
    /// Store or repository failures that were logged and skipped
    pub failures: u64,
    /// Purges that skipped patterns or hit the key budget
    pub incomplete_purges: u64,
    pub last_invalidation: Option<LastInvalidation>,
}

/// Instance-scoped collector behind [`InvalidationStats`].
#[derive(Debug, Default)]
pub struct InvalidationStatsCollector {
    inner: Mutex<InvalidationStats>,
}

impl InvalidationStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the counters.
    pub fn update(&self, f: impl FnOnce(&mut InvalidationStats)) {
        f(&mut *self.lock());
    }

    /// Records the outcome of an invalidation as the latest one.
    pub fn record_last(&self, kind: &str, target: impl Into<String>, success: bool) {
        self.lock().last_invalidation = Some(LastInvalidation {
            kind: kind.to_string(),
            target: target.into(),
            success,
            at: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> InvalidationStats {
        self.lock().clone()
    }

    pub fn reset(&self) {
        *self.lock() = InvalidationStats::default();
    }

    fn lock(&self) -> MutexGuard<'_, InvalidationStats> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
