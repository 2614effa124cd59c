//! Catalog Cache - multi-level cache coordination for a product catalog
//!
//! Deterministic key derivation, read-through caching at the entity, query,
//! aggregate and service levels, and event-driven invalidation over any
//! [`cache::CacheStore`].

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod manager;
pub mod models;
pub mod repository;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheLevel, CacheStore, MemoryStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use invalidation::{InvalidationContext, InvalidationEvent, Invalidator};
pub use keys::{CacheContext, KeyGenerator};
pub use manager::CacheManager;
pub use repository::Repository;
pub use tasks::spawn_cleanup_task;
