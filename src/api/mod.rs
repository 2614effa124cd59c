//! API Module
//!
//! Admin HTTP surface: health, metrics and invalidation endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
