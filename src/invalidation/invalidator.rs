//! Invalidator Module
//!
//! Turns committed domain mutations into cache purges. Every method logs and
//! counts its failures instead of returning them, except pattern validation:
//! a pattern that could reach outside this domain and tenant is refused
//! before the store sees it.
//!
//! Callers must only invalidate after the triggering write is durably
//! committed; [`Invalidator::after_commit`] encodes that ordering.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheLevel, CacheStore, DeleteOptions, StatsCollector, SAMPLE_KEY_LIMIT};
use crate::config::Config;
use crate::error::Result;
use crate::invalidation::events::{AGGREGATE_KINDS, RELATED_QUERY_TYPES};
use crate::invalidation::{
    EventTable, InvalidationContext, InvalidationEvent, InvalidationStats,
    InvalidationStatsCollector,
};
use crate::keys::{KeyGenerator, Scope};
use crate::repository::Repository;

// == Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityOptions {
    /// Also purge list/search/category/status queries
    pub invalidate_related: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            invalidate_related: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOptions {
    /// Report matches without deleting
    pub dry_run: bool,
    /// Key budget for the whole call; the configured limit when absent
    pub max_keys: Option<usize>,
}

impl PurgeOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            max_keys: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOptions {
    /// Ids per chunk; the configured size when absent
    pub chunk_size: Option<usize>,
}

// == Reports ==
/// Totals of a pattern purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub patterns: Vec<String>,
    pub matched: usize,
    pub deleted: usize,
    pub sample_keys: Vec<String>,
    /// Patterns whose store call failed
    pub failures: usize,
    /// Patterns never run because the key budget ran out
    pub skipped: Vec<String>,
    /// Some pattern matched more keys than the budget allowed
    pub truncated: bool,
    pub dry_run: bool,
}

impl PurgeReport {
    fn absorb(&mut self, other: PurgeReport) {
        self.patterns.extend(other.patterns);
        self.matched += other.matched;
        self.deleted += other.deleted;
        let room = SAMPLE_KEY_LIMIT.saturating_sub(self.sample_keys.len());
        self.sample_keys.extend(other.sample_keys.into_iter().take(room));
        self.failures += other.failures;
        self.skipped.extend(other.skipped);
        self.truncated |= other.truncated;
    }

    /// True when every pattern ran to completion. Otherwise matching keys
    /// may remain and the purge must be repeated.
    pub fn is_complete(&self) -> bool {
        self.failures == 0 && self.skipped.is_empty() && !self.truncated
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventReport {
    pub event: String,
    /// False when the event has no mapping
    pub handled: bool,
    pub entities_invalidated: usize,
    pub entity_failures: usize,
    pub queries: PurgeReport,
    pub aggregates: PurgeReport,
}

impl EventReport {
    /// False when any entity or pattern failed, or a purge stopped short.
    pub fn is_complete(&self) -> bool {
        self.entity_failures == 0 && self.queries.is_complete() && self.aggregates.is_complete()
    }
}

/// Outcome of a bulk invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub requested: usize,
    pub invalidated: usize,
    pub failed: usize,
    pub chunks: usize,
    /// The single query/aggregate pass run after all ids
    pub trailing: PurgeReport,
}

// == Invalidator ==
/// Coherence between committed writes and the cache.
pub struct Invalidator {
    store: Arc<dyn CacheStore>,
    keys: KeyGenerator,
    events: Arc<EventTable>,
    repository: Option<Arc<dyn Repository>>,
    stats: Arc<InvalidationStatsCollector>,
    cache_stats: Option<Arc<StatsCollector>>,
    max_scan_keys: usize,
    bulk_chunk_size: usize,
}

impl Invalidator {
    // == Constructor ==
    pub fn new(store: Arc<dyn CacheStore>, keys: KeyGenerator) -> Self {
        Self::from_config(store, keys, &Config::default())
    }

    pub fn from_config(store: Arc<dyn CacheStore>, keys: KeyGenerator, config: &Config) -> Self {
        Self {
            store,
            keys,
            events: Arc::new(EventTable::standard()),
            repository: None,
            stats: Arc::new(InvalidationStatsCollector::new()),
            cache_stats: None,
            max_scan_keys: config.max_scan_keys.max(1),
            bulk_chunk_size: config.bulk_chunk_size.max(1),
        }
    }

    /// Also purges the repository's own cache.
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Mirrors per-level invalidation counts into a manager's collector.
    pub fn with_cache_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.cache_stats = Some(stats);
        self
    }

    pub fn with_stats(mut self, stats: Arc<InvalidationStatsCollector>) -> Self {
        self.stats = stats;
        self
    }

    pub fn events(&self) -> &EventTable {
        &self.events
    }

    pub fn keys(&self) -> &KeyGenerator {
        &self.keys
    }

    pub fn get_invalidation_stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }

    // == Entity ==
    /// Deletes the entity key for `id`, plus related query scopes unless disabled.
    ///
    /// Returns false if any part failed. Repeating the call is harmless.
    pub async fn invalidate_entity(&self, id: impl fmt::Display, options: EntityOptions) -> bool {
        let id = id.to_string();
        let key = self.keys.entity_key(&id).to_string();

        let mut success = match self.store.delete(&key).await {
            Ok(existed) => {
                debug!(key = %key, existed, "Entity key invalidated");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Entity invalidation failed");
                false
            }
        };

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.clear_entity_cache(&id).await {
                warn!(id = %id, error = %e, "Repository entity cache clear failed");
                success = false;
            }
        }

        if success {
            self.stats.update(|s| s.entity_invalidations += 1);
            self.mirror(CacheLevel::Entity, 1);
        } else {
            self.stats.update(|s| s.failures += 1);
        }

        if options.invalidate_related {
            let patterns = RELATED_QUERY_TYPES
                .iter()
                .map(|t| self.keys.pattern_for(&Scope::QueryType(t.to_string())))
                .collect();
            let related = self.purge(patterns, PurgeOptions::default()).await;
            success &= related.is_complete();
        }

        self.stats.record_last("entity", id, success);
        success
    }

    // == Query ==
    /// Deletes every key matching `patterns`, within one key budget.
    ///
    /// All patterns are validated first; one bad pattern rejects the whole
    /// call before any store access.
    pub async fn invalidate_query_cache<S: AsRef<str>>(
        &self,
        patterns: &[S],
        options: PurgeOptions,
    ) -> Result<PurgeReport> {
        for pattern in patterns {
            if let Err(e) = self.keys.validate_pattern(pattern.as_ref()) {
                self.stats.update(|s| s.rejected_patterns += 1);
                warn!(pattern = %pattern.as_ref(), error = %e, "Refusing invalidation pattern");
                return Err(e);
            }
        }

        let patterns: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        let target = format!("{} pattern(s)", patterns.len());
        let report = self.purge(patterns, options).await;
        self.stats.record_last("query", target, report.is_complete());
        Ok(report)
    }

    // == Aggregate ==
    /// Purges the named aggregate buckets; every bucket when `kinds` is empty.
    pub async fn invalidate_aggregate_cache<S: AsRef<str>>(&self, kinds: &[S]) -> PurgeReport {
        let patterns: Vec<String> = if kinds.is_empty() {
            vec![self.keys.pattern_for(&Scope::Level(CacheLevel::Aggregate))]
        } else {
            kinds
                .iter()
                .map(|kind| self.keys.pattern_for(&Scope::Aggregate(kind.as_ref().to_string())))
                .collect()
        };

        let target = if kinds.is_empty() {
            "all".to_string()
        } else {
            kinds.iter().map(|k| k.as_ref()).collect::<Vec<_>>().join(",")
        };
        let report = self.purge(patterns, PurgeOptions::default()).await;
        self.stats.record_last("aggregate", target, report.is_complete());
        report
    }

    // == Events ==
    /// Dispatches an event by name. Unknown names are logged and ignored.
    pub async fn invalidate_by_event(
        &self,
        event: &str,
        context: &InvalidationContext,
    ) -> EventReport {
        match event.parse::<InvalidationEvent>() {
            Ok(event) => self.invalidate_event(event, context).await,
            Err(_) => {
                self.stats.update(|s| s.unknown_events += 1);
                warn!(event = %event, "No invalidation mapping for event, skipping");
                EventReport {
                    event: event.to_string(),
                    handled: false,
                    ..Default::default()
                }
            }
        }
    }

    /// Dispatches a mapped event to the per-level invalidations.
    pub async fn invalidate_event(
        &self,
        event: InvalidationEvent,
        context: &InvalidationContext,
    ) -> EventReport {
        let mut entity_ids: Vec<String> = Vec::new();
        let mut query_patterns: Vec<String> = Vec::new();
        let mut aggregate_patterns: Vec<String> = Vec::new();

        for template in self.events.descriptors(event) {
            for scope in template.resolve(context) {
                match scope {
                    Scope::Entity(id) => {
                        if !entity_ids.contains(&id) {
                            entity_ids.push(id);
                        }
                    }
                    other => {
                        let pattern = self.keys.pattern_for(&other);
                        let bucket = match template.level() {
                            CacheLevel::Aggregate => &mut aggregate_patterns,
                            _ => &mut query_patterns,
                        };
                        if !bucket.contains(&pattern) {
                            bucket.push(pattern);
                        }
                    }
                }
            }
        }

        let mut report = EventReport {
            event: event.to_string(),
            handled: true,
            ..Default::default()
        };

        let entity_options = EntityOptions {
            invalidate_related: false,
        };
        for id in &entity_ids {
            if self.invalidate_entity(id, entity_options).await {
                report.entities_invalidated += 1;
            } else {
                report.entity_failures += 1;
            }
        }

        report.queries = self.purge(query_patterns, PurgeOptions::default()).await;
        report.aggregates = self.purge(aggregate_patterns, PurgeOptions::default()).await;

        let success = report.is_complete();
        self.stats.update(|s| s.events_processed += 1);
        self.stats.record_last("event", event.as_str(), success);

        info!(
            event = %event,
            entities = report.entities_invalidated,
            query_keys = report.queries.deleted,
            aggregate_keys = report.aggregates.deleted,
            skipped = report.queries.skipped.len() + report.aggregates.skipped.len(),
            success,
            "Invalidation event processed"
        );
        report
    }

    /// Awaits `commit` and dispatches `event` only if it succeeded.
    pub async fn after_commit<T, E, Fut>(
        &self,
        commit: Fut,
        event: InvalidationEvent,
        context: &InvalidationContext,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let committed = commit.await?;
        self.invalidate_event(event, context).await;
        Ok(committed)
    }

    // == Bulk ==
    /// Invalidates many entities in chunks, then runs one query/aggregate pass.
    pub async fn bulk_invalidate<I>(&self, ids: I, options: BulkOptions) -> BulkReport
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
        let chunk_size = options.chunk_size.unwrap_or(self.bulk_chunk_size).max(1);
        let entity_options = EntityOptions {
            invalidate_related: false,
        };

        let mut report = BulkReport {
            requested: ids.len(),
            ..Default::default()
        };

        for chunk in ids.chunks(chunk_size) {
            report.chunks += 1;
            for id in chunk {
                if self.invalidate_entity(id, entity_options).await {
                    report.invalidated += 1;
                } else {
                    report.failed += 1;
                }
            }
            debug!(chunk = report.chunks, size = chunk.len(), "Bulk invalidation chunk done");
        }

        if !ids.is_empty() {
            let mut patterns: Vec<String> = RELATED_QUERY_TYPES
                .iter()
                .map(|t| self.keys.pattern_for(&Scope::QueryType(t.to_string())))
                .collect();
            patterns.extend(
                AGGREGATE_KINDS
                    .iter()
                    .map(|kind| self.keys.pattern_for(&Scope::Aggregate(kind.to_string()))),
            );
            report.trailing = self.purge(patterns, PurgeOptions::default()).await;
        }

        self.stats.update(|s| s.bulk_operations += 1);
        self.stats.record_last(
            "bulk",
            format!("{} id(s)", report.requested),
            report.failed == 0 && report.trailing.is_complete(),
        );
        info!(
            requested = report.requested,
            invalidated = report.invalidated,
            failed = report.failed,
            chunks = report.chunks,
            "Bulk invalidation finished"
        );
        report
    }

    // == Full Purge ==
    /// Purges every level for this domain and tenant, and the repository cache.
    ///
    /// The key budget still applies; a store larger than the budget needs
    /// repeated calls.
    pub async fn invalidate_all(&self, options: PurgeOptions) -> PurgeReport {
        warn!(dry_run = options.dry_run, "Full cache purge requested");

        let patterns = CacheLevel::ALL
            .iter()
            .map(|level| self.keys.pattern_for(&Scope::Level(*level)))
            .collect();
        let mut report = self.purge(patterns, options).await;

        if !options.dry_run {
            if let Some(repository) = &self.repository {
                if let Err(e) = repository.clear_cache().await {
                    warn!(error = %e, "Repository cache clear failed");
                    report.failures += 1;
                    self.stats.update(|s| s.failures += 1);
                }
            }
            self.stats.update(|s| s.full_purges += 1);
            self.stats.record_last("all", "everything", report.is_complete());
        }

        warn!(
            matched = report.matched,
            deleted = report.deleted,
            failures = report.failures,
            complete = report.is_complete(),
            dry_run = options.dry_run,
            "Full cache purge finished"
        );
        report
    }

    // == Internals ==
    /// Runs already-validated patterns against the store within one key budget.
    async fn purge(&self, patterns: Vec<String>, options: PurgeOptions) -> PurgeReport {
        let mut report = PurgeReport {
            dry_run: options.dry_run,
            ..Default::default()
        };
        let mut budget = options.max_keys.unwrap_or(self.max_scan_keys);

        for pattern in patterns {
            if budget == 0 {
                warn!(pattern = %pattern, "Scan budget exhausted, skipping pattern");
                report.skipped.push(pattern);
                continue;
            }

            let level = pattern_level(&pattern);
            let delete_options = DeleteOptions::new(budget).dry_run(options.dry_run);

            match self.store.delete_matching(&pattern, delete_options).await {
                Ok(matched) => {
                    budget = budget.saturating_sub(matched.matched);
                    if !options.dry_run {
                        self.stats.update(|s| {
                            match level {
                                CacheLevel::Aggregate => s.aggregate_invalidations += 1,
                                _ => s.query_invalidations += 1,
                            }
                            s.keys_deleted += matched.deleted as u64;
                        });
                        self.mirror(level, matched.deleted as u64);
                    }
                    if matched.truncated {
                        warn!(
                            pattern = %pattern,
                            budget = delete_options.max_keys,
                            "Pattern matched more keys than the budget"
                        );
                    }
                    report.absorb(PurgeReport {
                        patterns: vec![pattern],
                        matched: matched.matched,
                        deleted: matched.deleted,
                        sample_keys: matched.sample_keys,
                        truncated: matched.truncated,
                        dry_run: options.dry_run,
                        ..Default::default()
                    });
                }
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Pattern invalidation failed");
                    self.stats.update(|s| s.failures += 1);
                    report.patterns.push(pattern);
                    report.failures += 1;
                }
            }
        }

        if !report.skipped.is_empty() || report.truncated {
            self.stats.update(|s| s.incomplete_purges += 1);
        }
        report
    }

    fn mirror(&self, level: CacheLevel, count: u64) {
        if let Some(stats) = &self.cache_stats {
            stats.record_invalidation(level, count);
        }
    }
}

impl fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invalidator")
            .field("keys", &self.keys)
            .field("events", &self.events.len())
            .field("repository", &self.repository.is_some())
            .field("max_scan_keys", &self.max_scan_keys)
            .field("bulk_chunk_size", &self.bulk_chunk_size)
            .finish()
    }
}

/// Level named by a pattern's namespace segment, query when it is a wildcard.
fn pattern_level(pattern: &str) -> CacheLevel {
    pattern
        .split(':')
        .nth(2)
        .and_then(CacheLevel::from_namespace)
        .unwrap_or(CacheLevel::Query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MatchReport, MemoryStore};
    use crate::error::CacheError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(600);

    /// Memory store that remembers every pattern it was asked to delete.
    struct RecordingStore {
        inner: MemoryStore,
        patterns: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(1000),
                patterns: Mutex::new(Vec::new()),
            }
        }

        fn patterns(&self) -> Vec<String> {
            self.patterns.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CacheStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<bool> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            self.inner.delete(key).await
        }

        async fn delete_matching(
            &self,
            pattern: &str,
            options: DeleteOptions,
        ) -> Result<MatchReport> {
            self.patterns.lock().unwrap().push(pattern.to_string());
            self.inner.delete_matching(pattern, options).await
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CountingRepository {
        entity_clears: AtomicUsize,
        full_clears: AtomicUsize,
    }

    #[async_trait]
    impl Repository for CountingRepository {
        async fn clear_entity_cache(&self, _id: &str) -> Result<()> {
            self.entity_clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn clear_cache(&self) -> Result<()> {
            self.full_clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup() -> (Arc<RecordingStore>, Invalidator) {
        let store = Arc::new(RecordingStore::new());
        let invalidator = Invalidator::new(store.clone(), KeyGenerator::default());
        (store, invalidator)
    }

    async fn seed(store: &RecordingStore, keys: &KeyGenerator) {
        for id in ["1", "2", "3"] {
            store.set(&keys.entity_key(id).to_string(), json!({"id": id}), TTL).await.unwrap();
        }
        for query_type in ["list", "search", "category", "status", "price"] {
            let key = keys.query_key(query_type, &json!({"page": 1}));
            store.set(&key.to_string(), json!([]), TTL).await.unwrap();
        }
        for kind in AGGREGATE_KINDS {
            let key = keys.aggregate_key(kind, &json!({}));
            store.set(&key.to_string(), json!({}), TTL).await.unwrap();
        }
        let key = keys.service_key("pricing", &json!({}));
        store.set(&key.to_string(), json!({}), TTL).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_entity_removes_entity_and_related_queries() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        assert!(invalidator.invalidate_entity(1, EntityOptions::default()).await);

        assert!(store.get(&keys.entity_key(1).to_string()).await.unwrap().is_none());
        assert!(store.get(&keys.entity_key(2).to_string()).await.unwrap().is_some());
        let list = keys.query_key("list", &json!({"page": 1})).to_string();
        assert!(store.get(&list).await.unwrap().is_none());
        let price = keys.query_key("price", &json!({"page": 1})).to_string();
        assert!(store.get(&price).await.unwrap().is_some());

        let stats = invalidator.get_invalidation_stats();
        assert_eq!(stats.entity_invalidations, 1);
        assert_eq!(stats.query_invalidations, RELATED_QUERY_TYPES.len() as u64);
        assert!(stats.last_invalidation.unwrap().success);
    }

    #[tokio::test]
    async fn test_invalidate_entity_is_idempotent() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        let options = EntityOptions {
            invalidate_related: false,
        };
        assert!(invalidator.invalidate_entity("2", options).await);
        assert!(invalidator.invalidate_entity("2", options).await);
        assert!(store.get(&keys.entity_key(2).to_string()).await.unwrap().is_none());
        assert!(store.patterns().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_pattern_never_reaches_store() {
        let (store, invalidator) = setup();

        let result = invalidator
            .invalidate_query_cache(&["catalog:default:query:*", "*"], PurgeOptions::default())
            .await;
        assert!(matches!(result, Err(CacheError::InvalidPattern(_))));

        let result = invalidator
            .invalidate_query_cache(&["other:default:query:*"], PurgeOptions::default())
            .await;
        assert!(matches!(result, Err(CacheError::InvalidPattern(_))));

        assert!(store.patterns().is_empty());
        assert_eq!(invalidator.get_invalidation_stats().rejected_patterns, 2);
    }

    #[tokio::test]
    async fn test_query_dry_run_reports_without_deleting() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        let report = invalidator
            .invalidate_query_cache(&["catalog:default:query:*"], PurgeOptions::dry_run())
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.matched, 5);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.inner.len().await, 12);
        assert_eq!(invalidator.get_invalidation_stats().keys_deleted, 0);
    }

    #[tokio::test]
    async fn test_scan_budget_is_shared_across_patterns() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        let options = PurgeOptions {
            dry_run: false,
            max_keys: Some(4),
        };
        let report = invalidator
            .invalidate_query_cache(
                &["catalog:default:query:*", "catalog:default:agg:*"],
                options,
            )
            .await
            .unwrap();
        assert_eq!(report.deleted, 4);
        assert!(report.truncated);
        assert_eq!(report.skipped, vec!["catalog:default:agg:*".to_string()]);
        assert!(!report.is_complete());
        assert!(!invalidator.get_invalidation_stats().last_invalidation.unwrap().success);
    }

    #[tokio::test]
    async fn test_event_exhausting_budget_is_reported_incomplete() {
        let store = Arc::new(RecordingStore::new());
        let config = Config {
            max_scan_keys: 3,
            ..Config::default()
        };
        let invalidator = Invalidator::from_config(store.clone(), KeyGenerator::default(), &config);
        let keys = invalidator.keys().clone();
        for page in 1..=3 {
            let key = keys.query_key("list", &json!({ "page": page }));
            store.set(&key.to_string(), json!([]), TTL).await.unwrap();
        }
        let search = keys.query_key("search", &json!({"q": "lamp"})).to_string();
        store.set(&search, json!([]), TTL).await.unwrap();

        let context = InvalidationContext::product(7);
        let report = invalidator.invalidate_by_event("product.updated", &context).await;

        assert!(report.handled);
        assert_eq!(report.queries.deleted, 3);
        assert!(report
            .queries
            .skipped
            .contains(&keys.pattern_for(&Scope::QueryType("search".to_string()))));
        assert!(!report.is_complete());
        assert!(store.get(&search).await.unwrap().is_some());

        let stats = invalidator.get_invalidation_stats();
        assert_eq!(stats.incomplete_purges, 1);
        assert!(!stats.last_invalidation.unwrap().success);

        let retry = invalidator.invalidate_by_event("product.updated", &context).await;
        assert!(retry.is_complete());
        assert!(store.get(&search).await.unwrap().is_none());
        assert!(invalidator.get_invalidation_stats().last_invalidation.unwrap().success);
    }

    #[tokio::test]
    async fn test_aggregate_invalidation_by_kind_and_all() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        let report = invalidator.invalidate_aggregate_cache(&["dashboard"]).await;
        assert_eq!(report.deleted, 1);

        let report = invalidator.invalidate_aggregate_cache::<&str>(&[]).await;
        assert_eq!(report.deleted, 2);
        assert_eq!(invalidator.get_invalidation_stats().aggregate_invalidations, 2);
    }

    #[tokio::test]
    async fn test_event_touches_exactly_its_scopes() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        let report = invalidator
            .invalidate_by_event("product.updated", &InvalidationContext::product(1))
            .await;
        assert!(report.handled);
        assert_eq!(report.entities_invalidated, 1);
        assert_eq!(report.queries.deleted, 3);
        assert_eq!(report.aggregates.deleted, 1);

        // status query and the other aggregates survive
        let status = keys.query_key("status", &json!({"page": 1})).to_string();
        assert!(store.get(&status).await.unwrap().is_some());
        let stats_key = keys.aggregate_key("statistics", &json!({})).to_string();
        assert!(store.get(&stats_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deleted_event_issues_pattern_deletes() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        invalidator
            .invalidate_event(InvalidationEvent::ProductDeleted, &InvalidationContext::product(3))
            .await;

        let patterns = store.patterns();
        assert!(patterns.len() >= 2);
        assert!(patterns.contains(&"catalog:default:query:*".to_string()));
        assert!(store.get(&keys.entity_key(3).to_string()).await.unwrap().is_none());
        assert_eq!(invalidator.get_invalidation_stats().events_processed, 1);
    }

    #[tokio::test]
    async fn test_unknown_event_is_ignored() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        let report = invalidator
            .invalidate_by_event("product.teleported", &InvalidationContext::product(1))
            .await;
        assert!(!report.handled);
        assert!(store.patterns().is_empty());
        assert_eq!(store.inner.len().await, 12);

        let stats = invalidator.get_invalidation_stats();
        assert_eq!(stats.unknown_events, 1);
        assert_eq!(stats.events_processed, 0);
    }

    #[tokio::test]
    async fn test_after_commit_skips_invalidation_on_failed_commit() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;
        let context = InvalidationContext::product(1);

        let failed: std::result::Result<(), &str> = invalidator
            .after_commit(async { Err("rollback") }, InvalidationEvent::ProductUpdated, &context)
            .await;
        assert!(failed.is_err());
        assert!(store.get(&keys.entity_key(1).to_string()).await.unwrap().is_some());

        let committed: std::result::Result<u32, &str> = invalidator
            .after_commit(async { Ok(7) }, InvalidationEvent::ProductUpdated, &context)
            .await;
        assert_eq!(committed, Ok(7));
        assert!(store.get(&keys.entity_key(1).to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_runs_one_trailing_pass() {
        let (store, invalidator) = setup();
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;

        let report = invalidator
            .bulk_invalidate(["1", "2", "3"], BulkOptions { chunk_size: Some(2) })
            .await;
        assert_eq!(report.requested, 3);
        assert_eq!(report.invalidated, 3);
        assert_eq!(report.chunks, 2);

        let patterns = store.patterns();
        assert_eq!(
            patterns.len(),
            RELATED_QUERY_TYPES.len() + AGGREGATE_KINDS.len()
        );
        for id in ["1", "2", "3"] {
            assert!(store.get(&keys.entity_key(id).to_string()).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_store_and_repository() {
        let store = Arc::new(RecordingStore::new());
        let repository = Arc::new(CountingRepository::default());
        let invalidator = Invalidator::new(store.clone(), KeyGenerator::default())
            .with_repository(repository.clone());
        let keys = invalidator.keys().clone();
        seed(&store, &keys).await;
        store.set("other:default:query:x:y:v1", json!(1), TTL).await.unwrap();

        let preview = invalidator.invalidate_all(PurgeOptions::dry_run()).await;
        assert_eq!(preview.matched, 12);
        assert_eq!(repository.full_clears.load(Ordering::SeqCst), 0);

        let report = invalidator.invalidate_all(PurgeOptions::default()).await;
        assert_eq!(report.deleted, 12);
        assert_eq!(store.inner.len().await, 1);
        assert_eq!(repository.full_clears.load(Ordering::SeqCst), 1);
        assert_eq!(invalidator.get_invalidation_stats().full_purges, 1);
    }

    #[tokio::test]
    async fn test_repository_cleared_per_entity() {
        let store = Arc::new(RecordingStore::new());
        let repository = Arc::new(CountingRepository::default());
        let invalidator = Invalidator::new(store, KeyGenerator::default())
            .with_repository(repository.clone());

        invalidator
            .bulk_invalidate(vec![10, 11], BulkOptions::default())
            .await;
        assert_eq!(repository.entity_clears.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_counted_not_raised() {
        let store = Arc::new(MemoryStore::new(100));
        store.set_available(false);
        let invalidator = Invalidator::new(store, KeyGenerator::default());

        assert!(!invalidator.invalidate_entity(1, EntityOptions::default()).await);
        let stats = invalidator.get_invalidation_stats();
        assert_eq!(stats.entity_invalidations, 0);
        assert!(stats.failures >= 1);
    }

    #[test]
    fn test_pattern_level() {
        assert_eq!(pattern_level("catalog:default:agg:*"), CacheLevel::Aggregate);
        assert_eq!(pattern_level("catalog:default:query:list:*"), CacheLevel::Query);
        assert_eq!(pattern_level("catalog:default:*"), CacheLevel::Query);
    }
}
