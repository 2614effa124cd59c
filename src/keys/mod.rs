//! Keys Module
//!
//! Canonical cache keys, deletion patterns and the TTL policy.

mod generator;
mod key;
mod normalize;


pub use generator::{CacheContext, KeyGenerator, Scope, ENTITY_TYPE};
pub use key::CacheKey;
pub use normalize::{normalize, normalize_params, params_hash, HASH_LENGTH};
