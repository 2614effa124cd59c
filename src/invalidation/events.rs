//! Invalidation Events
//!
//! The mapping from domain mutations to the cache scopes they void. This
//! table is the only place that decides what a write invalidates; call sites
//! name an event and never delete keys on their own.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cache::CacheLevel;
use crate::error::CacheError;
use crate::keys::Scope;

/// Query types that can embed a single product.
pub const RELATED_QUERY_TYPES: [&str; 4] = ["list", "search", "category", "status"];

/// Aggregate buckets derived from the product catalog.
pub const AGGREGATE_KINDS: [&str; 3] = ["statistics", "dashboard", "recommendations"];

// == Invalidation Event ==
/// A committed domain mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InvalidationEvent {
    #[serde(rename = "product.created")]
    ProductCreated,
    #[serde(rename = "product.updated")]
    ProductUpdated,
    #[serde(rename = "product.deleted")]
    ProductDeleted,
    #[serde(rename = "product.published")]
    ProductPublished,
    #[serde(rename = "product.status_changed")]
    ProductStatusChanged,
    #[serde(rename = "product.price_updated")]
    ProductPriceUpdated,
    #[serde(rename = "category.updated")]
    CategoryUpdated,
    #[serde(rename = "bulk.operation")]
    BulkOperation,
}

impl InvalidationEvent {
    pub const ALL: [InvalidationEvent; 8] = [
        InvalidationEvent::ProductCreated,
        InvalidationEvent::ProductUpdated,
        InvalidationEvent::ProductDeleted,
        InvalidationEvent::ProductPublished,
        InvalidationEvent::ProductStatusChanged,
        InvalidationEvent::ProductPriceUpdated,
        InvalidationEvent::CategoryUpdated,
        InvalidationEvent::BulkOperation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationEvent::ProductCreated => "product.created",
            InvalidationEvent::ProductUpdated => "product.updated",
            InvalidationEvent::ProductDeleted => "product.deleted",
            InvalidationEvent::ProductPublished => "product.published",
            InvalidationEvent::ProductStatusChanged => "product.status_changed",
            InvalidationEvent::ProductPriceUpdated => "product.price_updated",
            InvalidationEvent::CategoryUpdated => "category.updated",
            InvalidationEvent::BulkOperation => "bulk.operation",
        }
    }
}

impl fmt::Display for InvalidationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationEvent {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| CacheError::UnknownEvent(s.to_string()))
    }
}

// == Scope Template ==
/// A scope with the entity id left open until an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTemplate {
    /// Entity keys of the product(s) named in the context
    EntityRecord,
    QueryType(&'static str),
    AllQueries,
    Aggregate(&'static str),
    AllAggregates,
}

impl ScopeTemplate {
    pub fn level(&self) -> CacheLevel {
        match self {
            ScopeTemplate::EntityRecord => CacheLevel::Entity,
            ScopeTemplate::QueryType(_) | ScopeTemplate::AllQueries => CacheLevel::Query,
            ScopeTemplate::Aggregate(_) | ScopeTemplate::AllAggregates => CacheLevel::Aggregate,
        }
    }

    /// Concrete scopes for one event occurrence.
    pub fn resolve(&self, context: &InvalidationContext) -> Vec<Scope> {
        match self {
            ScopeTemplate::EntityRecord => context
                .entity_ids()
                .into_iter()
                .map(Scope::Entity)
                .collect(),
            ScopeTemplate::QueryType(t) => vec![Scope::QueryType(t.to_string())],
            ScopeTemplate::AllQueries => vec![Scope::Level(CacheLevel::Query)],
            ScopeTemplate::Aggregate(kind) => vec![Scope::Aggregate(kind.to_string())],
            ScopeTemplate::AllAggregates => vec![Scope::Level(CacheLevel::Aggregate)],
        }
    }
}

use ScopeTemplate::{AllAggregates, AllQueries, Aggregate, EntityRecord, QueryType};

/// Event to scope mapping, in dispatch order.
const EVENT_SCOPES: &[(InvalidationEvent, &[ScopeTemplate])] = &[
    (
        InvalidationEvent::ProductCreated,
        &[
            QueryType("list"),
            QueryType("search"),
            QueryType("category"),
            QueryType("status"),
            Aggregate("statistics"),
            Aggregate("dashboard"),
        ],
    ),
    (
        InvalidationEvent::ProductUpdated,
        &[
            EntityRecord,
            QueryType("list"),
            QueryType("search"),
            QueryType("category"),
            Aggregate("recommendations"),
        ],
    ),
    (
        InvalidationEvent::ProductDeleted,
        &[
            EntityRecord,
            AllQueries,
            Aggregate("statistics"),
            Aggregate("dashboard"),
            Aggregate("recommendations"),
        ],
    ),
    (
        InvalidationEvent::ProductPublished,
        &[
            EntityRecord,
            QueryType("list"),
            QueryType("search"),
            QueryType("status"),
            Aggregate("dashboard"),
        ],
    ),
    (
        InvalidationEvent::ProductStatusChanged,
        &[
            EntityRecord,
            QueryType("status"),
            QueryType("list"),
            Aggregate("statistics"),
            Aggregate("dashboard"),
        ],
    ),
    (
        InvalidationEvent::ProductPriceUpdated,
        &[
            EntityRecord,
            QueryType("list"),
            QueryType("search"),
            QueryType("price"),
            Aggregate("statistics"),
            Aggregate("recommendations"),
        ],
    ),
    (
        InvalidationEvent::CategoryUpdated,
        &[QueryType("category"), QueryType("list"), Aggregate("statistics")],
    ),
    (
        InvalidationEvent::BulkOperation,
        &[EntityRecord, AllQueries, AllAggregates],
    ),
];

// == Event Table ==
/// Immutable event mapping, built once at startup.
#[derive(Debug, Clone)]
pub struct EventTable {
    scopes: BTreeMap<InvalidationEvent, Vec<ScopeTemplate>>,
}

impl EventTable {
    /// The catalog's event mapping.
    pub fn standard() -> Self {
        Self {
            scopes: EVENT_SCOPES
                .iter()
                .map(|(event, templates)| (*event, templates.to_vec()))
                .collect(),
        }
    }

    /// Scope templates for `event`, empty when unmapped.
    pub fn descriptors(&self, event: InvalidationEvent) -> &[ScopeTemplate] {
        self.scopes.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn events(&self) -> impl Iterator<Item = InvalidationEvent> + '_ {
        self.scopes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl Default for EventTable {
    fn default() -> Self {
        Self::standard()
    }
}

// == Invalidation Context ==
/// Product ids carried by an event occurrence.
///
/// Ids are accepted as JSON strings or numbers. Other fields, such as a
/// category id, are ignored: no scope is keyed by them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationContext {
    #[serde(alias = "productId", deserialize_with = "optional_id")]
    pub product_id: Option<String>,
    #[serde(alias = "productIds", deserialize_with = "id_list")]
    pub product_ids: Vec<String>,
}

impl InvalidationContext {
    pub fn product(id: impl fmt::Display) -> Self {
        Self {
            product_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn products<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        Self {
            product_ids: ids.into_iter().map(|id| id.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Every product id named by the context, deduplicated, in order.
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.product_ids.len() + 1);
        for id in self.product_id.iter().chain(self.product_ids.iter()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

fn id_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(id_to_string))
}

fn id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values.into_iter().filter_map(id_to_string).collect())
}
