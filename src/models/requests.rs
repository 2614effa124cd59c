//! Request DTOs for the admin API

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::invalidation::{BulkOptions, EntityOptions, InvalidationContext, PurgeOptions};

/// Largest id list accepted by `POST /invalidate/bulk`.
pub const MAX_BULK_IDS: usize = 10_000;

/// Body of `POST /invalidate/event`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInvalidationRequest {
    /// Canonical event name, e.g. `product.updated`
    pub event: String,
    #[serde(default)]
    pub context: InvalidationContext,
}

impl EventInvalidationRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.event.trim().is_empty() {
            return Some("Event name cannot be empty".to_string());
        }
        None
    }
}

/// Query string of `POST /invalidate/entity/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityInvalidationParams {
    #[serde(default)]
    pub related: Option<bool>,
}

impl EntityInvalidationParams {
    pub fn options(&self) -> EntityOptions {
        EntityOptions {
            invalidate_related: self.related.unwrap_or(true),
        }
    }
}

/// Body of `POST /invalidate/bulk`. Ids may be strings or numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkInvalidationRequest {
    #[serde(deserialize_with = "string_ids")]
    pub ids: Vec<String>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

impl BulkInvalidationRequest {
    pub fn validate(&self) -> Option<String> {
        if self.ids.is_empty() {
            return Some("At least one id is required".to_string());
        }
        if self.ids.len() > MAX_BULK_IDS {
            return Some(format!("At most {} ids per request", MAX_BULK_IDS));
        }
        if self.chunk_size == Some(0) {
            return Some("chunk_size must be positive".to_string());
        }
        None
    }

    pub fn options(&self) -> BulkOptions {
        BulkOptions {
            chunk_size: self.chunk_size,
        }
    }
}

/// Body of `POST /invalidate/patterns`.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternInvalidationRequest {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub max_keys: Option<usize>,
}

impl PatternInvalidationRequest {
    pub fn validate(&self) -> Option<String> {
        if self.patterns.is_empty() {
            return Some("At least one pattern is required".to_string());
        }
        None
    }

    pub fn options(&self) -> PurgeOptions {
        PurgeOptions {
            dry_run: self.dry_run,
            max_keys: self.max_keys,
        }
    }
}

/// Body of `POST /invalidate/all`.
///
/// A real purge must be confirmed; a dry run needs no confirmation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurgeAllRequest {
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub max_keys: Option<usize>,
}

impl PurgeAllRequest {
    pub fn validate(&self) -> Option<String> {
        if !self.dry_run && !self.confirm {
            return Some("Full purge requires \"confirm\": true".to_string());
        }
        None
    }

    pub fn options(&self) -> PurgeOptions {
        PurgeOptions {
            dry_run: self.dry_run,
            max_keys: self.max_keys,
        }
    }
}

fn string_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "ids must be strings or numbers, got {}",
                other
            ))),
        })
        .collect()
}
