//! Cache Level Module
//!
//! The four cache tiers and the declarative policy table that decides which
//! tier, TTL and write strategy an operation uses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// TTL ceiling applied to every strategy resolved for an admin context.
pub const ADMIN_TTL_CEILING: u64 = 300;

// == Cache Level ==
/// Cache tier a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLevel {
    /// L1: single objects keyed by id
    Entity,
    /// L2: filtered/sorted/paginated query results
    Query,
    /// L3: cross-entity computations
    Aggregate,
    /// Results of outer service calls
    Service,
}

impl CacheLevel {
    pub const ALL: [CacheLevel; 4] = [
        CacheLevel::Entity,
        CacheLevel::Query,
        CacheLevel::Aggregate,
        CacheLevel::Service,
    ];

    /// Key namespace segment for this level.
    pub fn namespace(&self) -> &'static str {
        match self {
            CacheLevel::Entity => "entity",
            CacheLevel::Query => "query",
            CacheLevel::Aggregate => "agg",
            CacheLevel::Service => "svc",
        }
    }

    /// Resolves a key namespace segment back to its level.
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.namespace() == namespace)
    }

    /// Write strategy used when this level stores a freshly computed value.
    pub fn strategy(&self) -> StrategyKind {
        match self {
            CacheLevel::Entity => StrategyKind::CacheAside,
            CacheLevel::Query => StrategyKind::QueryResult,
            CacheLevel::Aggregate => StrategyKind::WriteBehind,
            CacheLevel::Service => StrategyKind::CacheAside,
        }
    }

    /// Rough latency saved by one hit on this level, in milliseconds.
    pub fn estimated_saving_ms(&self) -> u64 {
        match self {
            CacheLevel::Entity => 2,
            CacheLevel::Query => 25,
            CacheLevel::Aggregate => 150,
            CacheLevel::Service => 50,
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheLevel::Entity => "entity",
            CacheLevel::Query => "query",
            CacheLevel::Aggregate => "aggregate",
            CacheLevel::Service => "service",
        };
        f.write_str(name)
    }
}

impl FromStr for CacheLevel {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" => Ok(CacheLevel::Entity),
            "query" => Ok(CacheLevel::Query),
            "aggregate" | "agg" => Ok(CacheLevel::Aggregate),
            "service" | "svc" => Ok(CacheLevel::Service),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown cache level: {}",
                other
            ))),
        }
    }
}

// == Strategy Kind ==
/// How a level populates the store after a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Check cache, fall back to source, store synchronously
    CacheAside,
    /// Cache-aside keyed by the normalized query parameters
    QueryResult,
    /// Store asynchronously on the background write path
    WriteBehind,
}

// == Cache Strategy ==
/// Resolved caching policy for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStrategy {
    pub level: CacheLevel,
    pub ttl: u64,
    pub strategy: StrategyKind,
}

/// Operation names grouped by the level that serves them.
const STRATEGY_TABLE: &[(&[&str], CacheLevel)] = &[
    (&["get", "find", "show", "detail"], CacheLevel::Entity),
    (&["list", "search", "filter", "category", "status"], CacheLevel::Query),
    (
        &["statistics", "dashboard", "report", "recommendations", "analytics"],
        CacheLevel::Aggregate,
    ),
    (&["export", "import", "sync"], CacheLevel::Service),
];

/// TTL for operations not listed in the strategy table.
const FALLBACK_TTL: u64 = 300;

/// Looks up the policy for an operation name.
///
/// Listed operations take their level's base TTL from `base_ttl`; unknown
/// operations are served from the query level with a short TTL. Admin
/// contexts never get a TTL above [`ADMIN_TTL_CEILING`].
pub fn strategy_for(
    operation_type: &str,
    base_ttl: impl Fn(CacheLevel) -> u64,
    elevated_privilege: bool,
) -> CacheStrategy {
    let operation = operation_type.to_ascii_lowercase();
    let (level, ttl) = STRATEGY_TABLE
        .iter()
        .find(|(names, _)| names.contains(&operation.as_str()))
        .map(|(_, level)| (*level, base_ttl(*level)))
        .unwrap_or((CacheLevel::Query, FALLBACK_TTL));

    let ttl = if elevated_privilege {
        ttl.min(ADMIN_TTL_CEILING)
    } else {
        ttl
    };

    CacheStrategy {
        level,
        ttl,
        strategy: level.strategy(),
    }
}
