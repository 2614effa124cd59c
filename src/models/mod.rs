//! Request and Response models for the admin API
//!
//! DTOs for the invalidation and health endpoints. Reports produced by the
//! invalidator and the manager are serialized as they are.

pub mod requests;
pub mod responses;

pub use requests::{
    BulkInvalidationRequest, EntityInvalidationParams, EventInvalidationRequest,
    PatternInvalidationRequest, PurgeAllRequest,
};
pub use responses::{EntityInvalidationResponse, HealthResponse};
