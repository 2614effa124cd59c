//! Cache Module
//!
//! Cache tiers, per-level statistics and the store contract.

mod entry;
mod level;
mod memory;
mod stats;
mod store;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use level::{strategy_for, CacheLevel, CacheStrategy, StrategyKind, ADMIN_TTL_CEILING};
pub use memory::MemoryStore;
pub use stats::{CacheStats, StatsCollector};
pub use store::{CacheStore, DeleteOptions, MatchReport, SAMPLE_KEY_LIMIT};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 255;

/// Lowest TTL in seconds any policy may produce
pub const MIN_TTL: u64 = 60;

/// Highest TTL in seconds any policy may produce
pub const MAX_TTL: u64 = 86_400;
