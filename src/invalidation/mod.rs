//! Invalidation Module
//!
//! Event-driven and explicit cache invalidation.

pub mod events;
mod invalidator;
mod stats;

pub use events::{EventTable, InvalidationContext, InvalidationEvent, ScopeTemplate};
pub use invalidator::{
    BulkOptions, BulkReport, EntityOptions, EventReport, Invalidator, PurgeOptions, PurgeReport,
};
pub use stats::{InvalidationStats, InvalidationStatsCollector, LastInvalidation};
