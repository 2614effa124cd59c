//! Cache Store Module
//!
//! The key/value store contract the manager and invalidator talk to.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Maximum number of matched keys echoed back in a [`MatchReport`].
pub const SAMPLE_KEY_LIMIT: usize = 10;

// == Delete Options ==
/// Bounds for a pattern deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Stop after this many matching keys
    pub max_keys: usize,
    /// Count matches without deleting anything
    pub dry_run: bool,
}

impl DeleteOptions {
    pub fn new(max_keys: usize) -> Self {
        Self {
            max_keys,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// == Match Report ==
/// Outcome of a pattern deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    /// Keys that matched (capped by `max_keys`)
    pub matched: usize,
    /// Keys actually removed (0 on a dry run)
    pub deleted: usize,
    /// Up to [`SAMPLE_KEY_LIMIT`] of the matched keys
    pub sample_keys: Vec<String>,
    /// More keys matched than `max_keys` allowed
    pub truncated: bool,
}

impl MatchReport {
    /// Folds another report into this one, keeping the sample bounded.
    pub fn merge(&mut self, other: MatchReport) {
        self.matched += other.matched;
        self.deleted += other.deleted;
        let room = SAMPLE_KEY_LIMIT.saturating_sub(self.sample_keys.len());
        self.sample_keys.extend(other.sample_keys.into_iter().take(room));
        self.truncated |= other.truncated;
    }
}

// == Cache Store ==
/// Shared key/value store with glob deletion.
///
/// Implementations report failures as errors; the layers above decide how
/// to recover. Patterns handed to `delete_matching` have already been
/// validated.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value under `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key` for `ttl`. Returns whether it was stored.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<bool>;

    /// Removes `key`. Returns whether a value was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key matching the glob `pattern`, within `options`.
    async fn delete_matching(&self, pattern: &str, options: DeleteOptions) -> Result<MatchReport>;

    /// Cheap liveness check.
    async fn is_available(&self) -> bool;
}
