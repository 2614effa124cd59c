//! Repository Module
//!
//! The data repository keeps its own small cache. It is purged alongside the
//! shared store so the two never disagree after a write.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Drops whatever the repository cached for one entity.
    async fn clear_entity_cache(&self, id: &str) -> Result<()>;

    /// Drops the repository's entire cache.
    async fn clear_cache(&self) -> Result<()>;
}
