//! Response DTOs for the admin API

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub store_available: bool,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    /// The service stays up without its store; it only loses caching.
    pub fn from_store(store_available: bool) -> Self {
        let status = if store_available { "healthy" } else { "degraded" };
        Self {
            status: status.to_string(),
            store_available,
            timestamp: Utc::now(),
        }
    }
}

/// Response body for `POST /invalidate/entity/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct EntityInvalidationResponse {
    pub id: String,
    pub success: bool,
    pub related: bool,
}
