//! Logical identity of a cached value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::cache::CacheLevel;
use crate::keys::{CacheKey, KeyGenerator};

/// What is being cached, independent of how its key is spelled.
///
/// The level is implied by the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum CacheIdentity {
    Entity { id: String },
    Query { query_type: String, params: Value },
    Aggregate { kind: String, params: Value },
    Service { name: String, params: Value },
}

impl CacheIdentity {
    pub fn entity(id: impl fmt::Display) -> Self {
        CacheIdentity::Entity { id: id.to_string() }
    }

    pub fn query<P: Serialize + ?Sized>(query_type: impl Into<String>, params: &P) -> Self {
        CacheIdentity::Query {
            query_type: query_type.into(),
            params: to_params(params),
        }
    }

    pub fn aggregate<P: Serialize + ?Sized>(kind: impl Into<String>, params: &P) -> Self {
        CacheIdentity::Aggregate {
            kind: kind.into(),
            params: to_params(params),
        }
    }

    pub fn service<P: Serialize + ?Sized>(name: impl Into<String>, params: &P) -> Self {
        CacheIdentity::Service {
            name: name.into(),
            params: to_params(params),
        }
    }

    pub fn level(&self) -> CacheLevel {
        match self {
            CacheIdentity::Entity { .. } => CacheLevel::Entity,
            CacheIdentity::Query { .. } => CacheLevel::Query,
            CacheIdentity::Aggregate { .. } => CacheLevel::Aggregate,
            CacheIdentity::Service { .. } => CacheLevel::Service,
        }
    }

    /// Canonical key for this identity.
    pub fn key(&self, keys: &KeyGenerator) -> CacheKey {
        match self {
            CacheIdentity::Entity { id } => keys.entity_key(id),
            CacheIdentity::Query { query_type, params } => keys.query_key(query_type, params),
            CacheIdentity::Aggregate { kind, params } => keys.aggregate_key(kind, params),
            CacheIdentity::Service { name, params } => keys.service_key(name, params),
        }
    }
}

fn to_params<P: Serialize + ?Sized>(params: &P) -> Value {
    serde_json::to_value(params).unwrap_or_else(|e| {
        warn!(error = %e, "Cache identity parameters are not serializable");
        Value::Null
    })
}
