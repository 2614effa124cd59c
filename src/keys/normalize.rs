//! Parameter normalization and hashing.
//!
//! Object keys are sorted and objects are turned into arrays of `[key, value]`
//! pairs, recursively, so two parameter sets that differ only in insertion
//! order hash identically. Arrays keep their element order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Hex characters kept from the SHA-256 digest.
pub const HASH_LENGTH: usize = 16;

/// Canonical, order-independent form of a JSON value.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Value::Array(
                pairs
                    .into_iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), normalize(v)]))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        scalar => scalar.clone(),
    }
}

/// Normalizes any serializable value.
///
/// Values serde cannot represent as JSON (for example maps with non-string
/// keys) normalize to `null` with a warning instead of failing.
pub fn normalize_params<T: Serialize + ?Sized>(params: &T) -> Value {
    match serde_json::to_value(params) {
        Ok(value) => normalize(&value),
        Err(e) => {
            warn!(error = %e, "Cache parameters are not serializable, hashing as null");
            Value::Null
        }
    }
}

/// Short hex digest of the normalized parameters.
pub fn params_hash<T: Serialize + ?Sized>(params: &T) -> String {
    let canonical = normalize_params(params).to_string();
    short_hash(&canonical)
}

/// First [`HASH_LENGTH`] hex characters of the SHA-256 of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LENGTH);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_object_becomes_sorted_pairs() {
        let normalized = normalize(&json!({"b": 1, "a": {"d": 2, "c": 3}}));
        assert_eq!(
            normalized,
            json!([["a", [["c", 3], ["d", 2]]], ["b", 1]])
        );
    }

    #[test]
    fn test_array_order_is_kept() {
        assert_eq!(normalize(&json!([3, 1, 2])), json!([3, 1, 2]));
        assert_ne!(params_hash(&json!([1, 2])), params_hash(&json!([2, 1])));
    }

    #[test]
    fn test_hash_ignores_insertion_order() {
        let mut a = HashMap::new();
        a.insert("status", json!("A"));
        a.insert("limit", json!(10));
        let mut b = BTreeMap::new();
        b.insert("limit", json!(10));
        b.insert("status", json!("A"));

        assert_eq!(params_hash(&a), params_hash(&b));
        assert_eq!(params_hash(&a), params_hash(&json!({"status": "A", "limit": 10})));
    }

    #[test]
    fn test_hash_distinguishes_values() {
        assert_ne!(
            params_hash(&json!({"limit": 10})),
            params_hash(&json!({"limit": "10"}))
        );
        assert_ne!(
            params_hash(&json!({"limit": 10})),
            params_hash(&json!({"limit": 20}))
        );
    }

    #[test]
    fn test_unserializable_params_do_not_fail() {
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);

        assert_eq!(normalize_params(&bad), Value::Null);
        assert_eq!(params_hash(&bad), params_hash(&Value::Null));
    }

    #[test]
    fn test_short_hash_length() {
        let hash = short_hash("anything");
        assert_eq!(hash.len(), HASH_LENGTH);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
