//! Structured cache keys.

use std::fmt;

use serde::Serialize;

use crate::cache::CacheLevel;

/// Number of `:`-separated segments in a rendered key.
const SEGMENTS: usize = 6;

// == Cache Key ==
/// A cache key broken into its components.
///
/// Rendered as `domain:tenant:namespace:qualifier:discriminator:vN`, for
/// example `catalog:default:entity:product:42:v1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub domain: String,
    pub tenant: String,
    pub level: CacheLevel,
    /// Entity type, query type, aggregate kind or service name
    pub qualifier: String,
    /// Entity id, or the hash of the normalized parameters
    pub discriminator: String,
    pub version: u32,
}

impl CacheKey {
    /// Parses a rendered key. Returns `None` for anything not in key format.
    pub fn parse(key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() != SEGMENTS || parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        let level = CacheLevel::from_namespace(parts[2])?;
        let version = parts[5].strip_prefix('v')?;
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(Self {
            domain: parts[0].to_string(),
            tenant: parts[1].to_string(),
            level,
            qualifier: parts[3].to_string(),
            discriminator: parts[4].to_string(),
            version: version.parse().ok()?,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:v{}",
            self.domain,
            self.tenant,
            self.level.namespace(),
            self.qualifier,
            self.discriminator,
            self.version
        )
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}
