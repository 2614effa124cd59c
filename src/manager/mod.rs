//! Manager Module
//!
//! Read-through cache access per level, warming and metrics.

mod cache_manager;
mod identity;
mod metrics;
mod warming;

pub use cache_manager::{CacheManager, MultiLevelOptions, RememberOptions};
pub use identity::CacheIdentity;
pub use metrics::{
    CacheMetrics, LevelMetrics, Recommendation, HIGH_HIT_RATE_THRESHOLD, LOW_HIT_RATE_THRESHOLD,
};
pub use warming::{WarmCriteria, WarmItem, WarmReport, WarmSource, WarmStrategy};
