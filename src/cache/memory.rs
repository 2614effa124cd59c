//! In-Memory Store Module
//!
//! HashMap-backed [`CacheStore`] with TTL expiry and glob deletion. Serves
//! the admin binary and the test suites; production deployments plug a shared
//! store in behind the same trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use glob::Pattern;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::store::{CacheStore, DeleteOptions, MatchReport, SAMPLE_KEY_LIMIT};
use crate::cache::{CacheEntry, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Memory Store ==
/// In-process key/value store.
#[derive(Debug)]
pub struct MemoryStore {
    /// Key-value storage
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Simulated outage switch
    available: AtomicBool,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a new store holding at most `max_entries` values.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            available: AtomicBool::new(true),
        }
    }

    /// Marks the store as reachable or not. While unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns the live keys in sorted order.
    pub async fn keys(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::StoreUnavailable(
                "memory store is marked unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.ensure_available()?;

        let now = current_timestamp_ms();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it so the next sweep has less to do
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<bool> {
        self.ensure_available()?;

        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key must be 1..={} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let mut entries = self.entries.write().await;

        // At capacity: evict the entry closest to expiry
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let victim = entries
                .values()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key.clone());
            match victim {
                Some(victim) => {
                    debug!(key = %victim, "Evicting entry to make room");
                    entries.remove(&victim);
                }
                None => return Ok(false),
            }
        }

        entries.insert(key.to_string(), CacheEntry::new(key, value, ttl.as_secs()));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_matching(&self, pattern: &str, options: DeleteOptions) -> Result<MatchReport> {
        self.ensure_available()?;

        let glob = Pattern::new(pattern)
            .map_err(|e| CacheError::InvalidPattern(format!("{}: {}", pattern, e)))?;

        let now = current_timestamp_ms();
        let mut entries = self.entries.write().await;
        let mut expired = Vec::new();
        let mut live = Vec::new();
        for (key, entry) in entries.iter().filter(|(key, _)| glob.matches(key)) {
            if entry.is_expired_at(now) {
                expired.push(key.clone());
            } else {
                live.push(key.clone());
            }
        }

        // Expired entries are swept without charging the budget.
        if !options.dry_run {
            for key in &expired {
                entries.remove(key);
            }
        }

        live.sort();
        let truncated = live.len() > options.max_keys;
        live.truncate(options.max_keys);

        let deleted = if options.dry_run {
            0
        } else {
            live.iter()
                .filter(|key| entries.remove(key.as_str()).is_some())
                .count()
        };

        debug!(
            pattern = %pattern,
            matched = live.len(),
            swept = expired.len(),
            truncated = truncated,
            "Pattern deletion"
        );

        Ok(MatchReport {
            matched: live.len(),
            deleted,
            sample_keys: live.into_iter().take(SAMPLE_KEY_LIMIT).collect(),
            truncated,
        })
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
