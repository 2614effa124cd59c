//! Configuration Module
//!
//! Handles loading key layout, TTL policy and invalidation limits from
//! environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::CacheLevel;

/// Cache layer configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Leading key segment shared by every key this layer writes
    pub domain: String,
    /// Tenant segment, the second key segment
    pub tenant: String,
    /// Key version; bumping it retires every existing key
    pub key_version: u32,
    /// Base TTL in seconds for entity keys
    pub entity_ttl: u64,
    /// Base TTL in seconds for query keys
    pub query_ttl: u64,
    /// Base TTL in seconds for aggregate keys
    pub aggregate_ttl: u64,
    /// Base TTL in seconds for service keys
    pub service_ttl: u64,
    /// First hour (inclusive, local time) of the low-traffic window
    pub low_traffic_start_hour: u32,
    /// Last hour (exclusive, local time) of the low-traffic window
    pub low_traffic_end_hour: u32,
    /// Maximum keys scanned/deleted by one pattern invalidation call
    pub max_scan_keys: usize,
    /// Number of ids invalidated per chunk in bulk invalidation
    pub bulk_chunk_size: usize,
    /// Capacity of the write-behind queue, 0 disables write-behind
    pub write_behind_capacity: usize,
    /// Maximum number of entries the in-memory store can hold
    pub max_entries: usize,
    /// HTTP admin server port
    pub server_port: u16,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DOMAIN` - Key domain segment (default: catalog)
    /// - `CACHE_TENANT` - Key tenant segment (default: default)
    /// - `CACHE_KEY_VERSION` - Key version suffix (default: 1)
    /// - `ENTITY_TTL` / `QUERY_TTL` / `AGGREGATE_TTL` / `SERVICE_TTL` - Base TTLs
    ///   in seconds (defaults: 3600 / 900 / 1800 / 300)
    /// - `LOW_TRAFFIC_START_HOUR` / `LOW_TRAFFIC_END_HOUR` - Low traffic window (default: 2..6)
    /// - `MAX_SCAN_KEYS` - Pattern deletion budget per call (default: 1000)
    /// - `BULK_CHUNK_SIZE` - Ids per bulk chunk (default: 100)
    /// - `WRITE_BEHIND_CAPACITY` - Write-behind queue size (default: 1024)
    /// - `MAX_ENTRIES` - In-memory store capacity (default: 10000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Expiry sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            domain: env::var("CACHE_DOMAIN").unwrap_or(defaults.domain),
            tenant: env::var("CACHE_TENANT").unwrap_or(defaults.tenant),
            key_version: env_or("CACHE_KEY_VERSION", defaults.key_version),
            entity_ttl: env_or("ENTITY_TTL", defaults.entity_ttl),
            query_ttl: env_or("QUERY_TTL", defaults.query_ttl),
            aggregate_ttl: env_or("AGGREGATE_TTL", defaults.aggregate_ttl),
            service_ttl: env_or("SERVICE_TTL", defaults.service_ttl),
            low_traffic_start_hour: env_or(
                "LOW_TRAFFIC_START_HOUR",
                defaults.low_traffic_start_hour,
            ),
            low_traffic_end_hour: env_or("LOW_TRAFFIC_END_HOUR", defaults.low_traffic_end_hour),
            max_scan_keys: env_or("MAX_SCAN_KEYS", defaults.max_scan_keys),
            bulk_chunk_size: env_or("BULK_CHUNK_SIZE", defaults.bulk_chunk_size),
            write_behind_capacity: env_or("WRITE_BEHIND_CAPACITY", defaults.write_behind_capacity),
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    /// Base TTL in seconds for a cache level.
    pub fn base_ttl(&self, level: CacheLevel) -> u64 {
        match level {
            CacheLevel::Entity => self.entity_ttl,
            CacheLevel::Query => self.query_ttl,
            CacheLevel::Aggregate => self.aggregate_ttl,
            CacheLevel::Service => self.service_ttl,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: "catalog".to_string(),
            tenant: "default".to_string(),
            key_version: 1,
            entity_ttl: 3600,
            query_ttl: 900,
            aggregate_ttl: 1800,
            service_ttl: 300,
            low_traffic_start_hour: 2,
            low_traffic_end_hour: 6,
            max_scan_keys: 1000,
            bulk_chunk_size: 100,
            write_behind_capacity: 1024,
            max_entries: 10_000,
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}
