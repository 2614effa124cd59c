//! Cache Manager Module
//!
//! Per-level read-through access. The cache never gates correctness: every
//! store or serialization failure is logged, counted and bypassed, and the
//! compute function's result is returned as if the cache did not exist.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{
    strategy_for, CacheLevel, CacheStore, CacheStrategy, StatsCollector, StrategyKind,
};
use crate::keys::{CacheContext, KeyGenerator};
use crate::manager::CacheIdentity;
use crate::tasks::{ErrorCallback, WriteBehindQueue, WriteJob};

// == Remember Options ==
/// Per-call knobs for [`CacheManager::remember`].
#[derive(Clone, Default)]
pub struct RememberOptions {
    /// Explicit TTL in seconds, bypassing the adaptive policy
    pub ttl: Option<u64>,
    /// Request properties fed to the TTL policy
    pub context: CacheContext,
    /// `Some(false)` forces a synchronous write, `Some(true)` forces write-behind
    pub asynchronous: Option<bool>,
    /// Invoked when a deferred write fails
    pub on_error: Option<ErrorCallback>,
}

impl RememberOptions {
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_context(mut self, context: CacheContext) -> Self {
        self.context = context;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.asynchronous = Some(false);
        self
    }

    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }
}

impl fmt::Debug for RememberOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RememberOptions")
            .field("ttl", &self.ttl)
            .field("context", &self.context)
            .field("asynchronous", &self.asynchronous)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Options for [`CacheManager::multi_level_get`].
#[derive(Debug, Clone, Default)]
pub struct MultiLevelOptions {
    /// Extra parameters merged into the query-level identity
    pub params: Map<String, Value>,
    pub context: CacheContext,
}

// == Cache Manager ==
/// Read-through access to the entity, query, aggregate and service levels.
pub struct CacheManager {
    pub(super) store: Arc<dyn CacheStore>,
    pub(super) keys: KeyGenerator,
    pub(super) stats: Arc<StatsCollector>,
    pub(super) write_behind: Option<WriteBehindQueue>,
}

impl CacheManager {
    // == Constructor ==
    /// Creates a manager with its own statistics collector and synchronous writes.
    pub fn new(store: Arc<dyn CacheStore>, keys: KeyGenerator) -> Self {
        Self {
            store,
            keys,
            stats: Arc::new(StatsCollector::new()),
            write_behind: None,
        }
    }

    /// Replaces the statistics collector. Call before attaching write-behind.
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = stats;
        self
    }

    /// Attaches an existing write-behind queue.
    pub fn with_write_behind(mut self, queue: WriteBehindQueue) -> Self {
        self.write_behind = Some(queue);
        self
    }

    /// Spawns a write-behind worker sharing this manager's store and statistics.
    pub fn spawn_write_behind(self, capacity: usize) -> (Self, JoinHandle<()>) {
        let (queue, handle) =
            WriteBehindQueue::spawn(self.store.clone(), self.stats.clone(), capacity);
        (self.with_write_behind(queue), handle)
    }

    pub fn keys(&self) -> &KeyGenerator {
        &self.keys
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    // == Remember ==
    /// Returns the cached value for `identity`, computing and storing it on a miss.
    ///
    /// On a hit `compute` is not called. On a miss it is called exactly once;
    /// an `Err` from it is returned unchanged and nothing is cached.
    pub async fn remember<T, E, F, Fut>(
        &self,
        identity: &CacheIdentity,
        compute: F,
        options: RememberOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let level = identity.level();
        let key = identity.key(&self.keys).to_string();

        if let Some(value) = self.lookup(&key, level).await {
            return Ok(value);
        }

        let value = compute().await?;
        self.store_value(&key, level, &value, &options).await;
        Ok(value)
    }

    /// [`remember`](Self::remember) for a single entity with default options.
    pub async fn remember_entity<T, E, F, Fut>(
        &self,
        id: impl fmt::Display,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.remember(&CacheIdentity::entity(id), compute, RememberOptions::default())
            .await
    }

    /// [`remember`](Self::remember) for a query result with default options.
    pub async fn remember_query<P, T, E, F, Fut>(
        &self,
        query_type: &str,
        params: &P,
        compute: F,
    ) -> Result<T, E>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.remember(
            &CacheIdentity::query(query_type, params),
            compute,
            RememberOptions::default(),
        )
        .await
    }

    /// [`remember`](Self::remember) for an aggregate; written behind unless told otherwise.
    pub async fn remember_aggregate<P, T, E, F, Fut>(
        &self,
        kind: &str,
        params: &P,
        compute: F,
        options: RememberOptions,
    ) -> Result<T, E>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.remember(&CacheIdentity::aggregate(kind, params), compute, options)
            .await
    }

    // == Direct Access ==
    /// Cached value for `identity`, if any. Counts as a hit or miss.
    pub async fn get<T: DeserializeOwned>(&self, identity: &CacheIdentity) -> Option<T> {
        let key = identity.key(&self.keys).to_string();
        self.lookup(&key, identity.level()).await
    }

    /// Stores `value` under `identity` following the level's write strategy.
    pub async fn put<T: Serialize>(
        &self,
        identity: &CacheIdentity,
        value: &T,
        options: RememberOptions,
    ) {
        let key = identity.key(&self.keys).to_string();
        self.store_value(&key, identity.level(), value, &options).await;
    }

    // == Multi-Level Get ==
    /// Entity level, then query level, then `primary`.
    ///
    /// After a full miss both levels are back-filled, best effort.
    pub async fn multi_level_get<T, E, F, Fut>(
        &self,
        id: impl fmt::Display,
        operation_type: &str,
        primary: F,
        options: MultiLevelOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let id = id.to_string();
        let entity = CacheIdentity::entity(&id);
        let mut params = options.params;
        params.insert("id".to_string(), Value::String(id));
        let query = CacheIdentity::query(operation_type, &params);

        if let Some(value) = self.get(&entity).await {
            debug!(operation = operation_type, "Multi-level hit at entity level");
            return Ok(value);
        }
        if let Some(value) = self.get(&query).await {
            debug!(operation = operation_type, "Multi-level hit at query level");
            return Ok(value);
        }

        let value = primary().await?;

        let backfill = RememberOptions::default()
            .with_context(options.context)
            .synchronous();
        self.put(&entity, &value, backfill.clone()).await;
        self.put(&query, &value, backfill).await;

        Ok(value)
    }

    // == Strategy ==
    /// Declarative caching policy for an operation name.
    pub fn get_cache_strategy(
        &self,
        operation_type: &str,
        context: &CacheContext,
    ) -> CacheStrategy {
        let strategy = strategy_for(
            operation_type,
            |level| self.keys.base_ttl(level),
            context.elevated_privilege,
        );
        debug!(
            operation = operation_type,
            level = %strategy.level,
            ttl = strategy.ttl,
            "Resolved cache strategy"
        );
        strategy
    }

    /// Waits for every queued write-behind write to be attempted.
    pub async fn flush_write_behind(&self) {
        if let Some(queue) = &self.write_behind {
            queue.flush().await;
        }
    }

    // == Internals ==
    async fn lookup<T: DeserializeOwned>(&self, key: &str, level: CacheLevel) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_value(raw) {
                Ok(value) => {
                    self.stats.record_hit(level);
                    debug!(key = %key, level = %level, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    self.stats.record_error(level);
                    self.stats.record_miss(level);
                    warn!(
                        key = %key,
                        level = %level,
                        error = %e,
                        "Cached value has unexpected shape, bypassing"
                    );
                    // Drop the unreadable value so the recomputed one replaces it
                    if let Err(e) = self.store.delete(key).await {
                        self.stats.record_error(level);
                        warn!(
                            key = %key,
                            level = %level,
                            error = %e,
                            "Dropping unreadable value failed"
                        );
                    }
                    None
                }
            },
            Ok(None) => {
                self.stats.record_miss(level);
                debug!(key = %key, level = %level, "Cache miss");
                None
            }
            Err(e) => {
                self.stats.record_error(level);
                self.stats.record_miss(level);
                warn!(key = %key, level = %level, error = %e, "Cache read failed, bypassing");
                None
            }
        }
    }

    async fn store_value<T: Serialize + ?Sized>(
        &self,
        key: &str,
        level: CacheLevel,
        value: &T,
        options: &RememberOptions,
    ) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                self.stats.record_error(level);
                warn!(
                    key = %key,
                    level = %level,
                    error = %e,
                    "Value is not cacheable, skipping store"
                );
                return;
            }
        };

        let ttl = options
            .ttl
            .unwrap_or_else(|| self.keys.ttl_for(key, Some(level), &options.context));
        let ttl = Duration::from_secs(ttl);

        let deferred = match options.asynchronous {
            Some(explicit) => explicit,
            None => level.strategy() == StrategyKind::WriteBehind,
        };

        if let (true, Some(queue)) = (deferred, &self.write_behind) {
            let job = WriteJob {
                key: key.to_string(),
                value,
                ttl,
                level,
                on_error: options.on_error.clone(),
            };
            if let Err(e) = queue.enqueue(job) {
                self.stats.record_error(level);
                warn!(
                    key = %key,
                    level = %level,
                    error = %e,
                    "Write-behind rejected, value not cached"
                );
                if let Some(callback) = &options.on_error {
                    callback(key, &e);
                }
            }
            return;
        }

        match self.store.set(key, value, ttl).await {
            Ok(true) => {
                self.stats.record_write(level);
                debug!(key = %key, level = %level, ttl = ttl.as_secs(), "Cache write");
            }
            Ok(false) => {
                self.stats.record_error(level);
                warn!(key = %key, level = %level, "Store declined cache write");
            }
            Err(e) => {
                self.stats.record_error(level);
                warn!(key = %key, level = %level, error = %e, "Cache write failed, bypassing");
            }
        }
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("keys", &self.keys)
            .field("write_behind", &self.write_behind.is_some())
            .finish()
    }
}
