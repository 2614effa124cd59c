//! Key Generator Module
//!
//! Derives canonical keys and deletion patterns, applies the adaptive TTL
//! policy, and validates keys and patterns before they reach the store.

use std::fmt;

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cache::{CacheLevel, MAX_KEY_LENGTH, MAX_TTL, MIN_TTL};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::keys::normalize::{params_hash, short_hash, HASH_LENGTH};
use crate::keys::CacheKey;

/// Longest entity id embedded verbatim; longer ids are hashed.
const MAX_VERBATIM_ID: usize = 64;

/// Longest qualifier embedded verbatim; longer qualifiers are hashed.
const MAX_VERBATIM_QUALIFIER: usize = 48;

/// Entity type used for entity keys.
pub const ENTITY_TYPE: &str = "product";

// == Cache Context ==
/// Request properties that shape the TTL policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheContext {
    /// Request made with admin rights
    pub elevated_privilege: bool,
    /// Caller needs near-live data
    pub realtime: bool,
    /// Local hour override (0-23); the wall clock is used when absent
    pub hour: Option<u32>,
}

impl CacheContext {
    pub fn admin() -> Self {
        Self {
            elevated_privilege: true,
            ..Default::default()
        }
    }

    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    pub fn at_hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour);
        self
    }
}

// == Scope ==
/// A set of keys addressed by a wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every key for one entity, across versions
    Entity(String),
    /// Every cached result of one query type
    QueryType(String),
    /// Every bucket of one aggregate kind
    Aggregate(String),
    /// Every cached result of one service call
    Service(String),
    /// Every key at one level
    Level(CacheLevel),
    /// Every key of this domain and tenant
    Everything,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Entity(id) => write!(f, "entity {}", id),
            Scope::QueryType(t) => write!(f, "query {}", t),
            Scope::Aggregate(kind) => write!(f, "aggregate {}", kind),
            Scope::Service(name) => write!(f, "service {}", name),
            Scope::Level(level) => write!(f, "all {}", level),
            Scope::Everything => f.write_str("everything"),
        }
    }
}

// == Key Generator ==
/// Deterministic key, pattern and TTL derivation for one domain and tenant.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    domain: String,
    tenant: String,
    version: u32,
    base_ttls: [u64; 4],
    low_traffic: (u32, u32),
}

impl KeyGenerator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            domain: sanitize_segment(&config.domain),
            tenant: sanitize_segment(&config.tenant),
            version: config.key_version,
            base_ttls: CacheLevel::ALL.map(|level| config.base_ttl(level)),
            low_traffic: (config.low_traffic_start_hour, config.low_traffic_end_hour),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    // == Keys ==
    /// Key for a single entity.
    pub fn entity_key(&self, id: impl fmt::Display) -> CacheKey {
        self.key(CacheLevel::Entity, ENTITY_TYPE, entity_discriminator(&id.to_string()))
    }

    /// Key for a query result; parameter order never changes the key.
    pub fn query_key<P: Serialize + ?Sized>(&self, query_type: &str, params: &P) -> CacheKey {
        self.key(CacheLevel::Query, query_type, params_hash(params))
    }

    /// Key for an aggregate bucket.
    pub fn aggregate_key<P: Serialize + ?Sized>(&self, kind: &str, params: &P) -> CacheKey {
        self.key(CacheLevel::Aggregate, kind, params_hash(params))
    }

    /// Key for a service call result.
    pub fn service_key<P: Serialize + ?Sized>(&self, name: &str, params: &P) -> CacheKey {
        self.key(CacheLevel::Service, name, params_hash(params))
    }

    fn key(&self, level: CacheLevel, qualifier: &str, discriminator: String) -> CacheKey {
        CacheKey {
            domain: self.domain.clone(),
            tenant: self.tenant.clone(),
            level,
            qualifier: qualifier_segment(qualifier),
            discriminator,
            version: self.version,
        }
    }

    // == Patterns ==
    /// Wildcard pattern covering every key in `scope`.
    pub fn pattern_for(&self, scope: &Scope) -> String {
        let prefix = format!("{}:{}", self.domain, self.tenant);
        match scope {
            Scope::Entity(id) => format!(
                "{}:{}:{}:{}:*",
                prefix,
                CacheLevel::Entity.namespace(),
                ENTITY_TYPE,
                entity_discriminator(id)
            ),
            Scope::QueryType(t) => self.qualifier_pattern(&prefix, CacheLevel::Query, t),
            Scope::Aggregate(kind) => self.qualifier_pattern(&prefix, CacheLevel::Aggregate, kind),
            Scope::Service(name) => self.qualifier_pattern(&prefix, CacheLevel::Service, name),
            Scope::Level(level) => format!("{}:{}:*", prefix, level.namespace()),
            Scope::Everything => format!("{}:*", prefix),
        }
    }

    fn qualifier_pattern(&self, prefix: &str, level: CacheLevel, qualifier: &str) -> String {
        format!(
            "{}:{}:{}:*",
            prefix,
            level.namespace(),
            qualifier_segment(qualifier)
        )
    }

    // == TTL Policy ==
    /// Base TTL in seconds for a level.
    pub fn base_ttl(&self, level: CacheLevel) -> u64 {
        self.base_ttls[level_index(level)]
    }

    /// Adaptive TTL in seconds, always within `[MIN_TTL, MAX_TTL]`.
    ///
    /// When `level` is `None` it is read from the key, defaulting to the
    /// query level for keys that do not parse.
    pub fn ttl_for(&self, key: &str, level: Option<CacheLevel>, context: &CacheContext) -> u64 {
        let level = level
            .or_else(|| CacheKey::parse(key).map(|k| k.level))
            .unwrap_or(CacheLevel::Query);

        let mut ttl = self.base_ttl(level);
        if context.elevated_privilege {
            ttl /= 2;
        }
        if context.realtime {
            ttl = (ttl / 2).max(MIN_TTL);
        }
        if self.is_low_traffic(context) {
            ttl = ttl.saturating_mul(2).min(MAX_TTL);
        }

        let ttl = ttl.clamp(MIN_TTL, MAX_TTL);
        trace!(key = %key, level = %level, ttl, "Resolved TTL");
        ttl
    }

    /// Whether the context's hour falls in the low-traffic window.
    pub fn is_low_traffic(&self, context: &CacheContext) -> bool {
        let hour = context
            .hour
            .unwrap_or_else(|| chrono::Local::now().hour());
        let (start, end) = self.low_traffic;
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    // == Introspection ==
    /// Parses a rendered key back into its components.
    pub fn parse_key(&self, key: &str) -> Option<CacheKey> {
        CacheKey::parse(key)
    }

    /// Length, character whitelist and version suffix check.
    pub fn is_valid_key(&self, key: &str) -> bool {
        !key.is_empty()
            && key.len() <= MAX_KEY_LENGTH
            && key.chars().all(is_key_char)
            && CacheKey::parse(key).is_some()
    }

    /// Rejects patterns that could delete outside this domain and tenant.
    pub fn validate_pattern(&self, pattern: &str) -> Result<()> {
        let reject = |reason: &str| {
            Err(CacheError::InvalidPattern(format!("{} ({})", reason, pattern)))
        };

        if pattern.is_empty() {
            return reject("empty pattern");
        }
        if pattern.len() > MAX_KEY_LENGTH {
            return reject("pattern too long");
        }
        if pattern.starts_with(is_wildcard) {
            return reject("pattern starts with a wildcard");
        }
        if !pattern.chars().all(|c| is_key_char(c) || is_wildcard(c)) {
            return reject("pattern contains disallowed characters");
        }

        let scope_prefix = format!("{}:{}:", self.domain, self.tenant);
        let literal = pattern.split(is_wildcard).next().unwrap_or_default();
        if !literal.starts_with(&scope_prefix) {
            return reject("pattern is not scoped to this domain and tenant");
        }

        Ok(())
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn level_index(level: CacheLevel) -> usize {
    match level {
        CacheLevel::Entity => 0,
        CacheLevel::Query => 1,
        CacheLevel::Aggregate => 2,
        CacheLevel::Service => 3,
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn is_wildcard(c: char) -> bool {
    c == '*' || c == '?'
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Lowercases and replaces characters that may not appear inside a segment.
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if is_segment_char(c) { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Safe ids are embedded as-is; anything else is hashed. Safe ids that
/// already look like a hashed discriminator are hashed again so the two
/// forms never meet.
fn entity_discriminator(id: &str) -> String {
    if !id.is_empty()
        && id.len() <= MAX_VERBATIM_ID
        && id.chars().all(is_segment_char)
        && !looks_hashed(id)
    {
        id.to_string()
    } else {
        hashed_segment(id)
    }
}

/// Sanitized qualifier, hashed when too long to keep keys bounded.
fn qualifier_segment(raw: &str) -> String {
    let cleaned = sanitize_segment(raw);
    if cleaned.len() <= MAX_VERBATIM_QUALIFIER && !looks_hashed(&cleaned) {
        cleaned
    } else {
        hashed_segment(&cleaned)
    }
}

fn hashed_segment(raw: &str) -> String {
    format!("h{}", short_hash(raw))
}

/// `h` followed by exactly one short hash of lowercase hex.
fn looks_hashed(segment: &str) -> bool {
    segment.len() == HASH_LENGTH + 1
        && segment.starts_with('h')
        && segment[1..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
