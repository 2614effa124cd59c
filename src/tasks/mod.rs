//! Background Tasks Module
//!
//! # Tasks
//! - TTL Cleanup: Sweeps expired entries out of the in-memory store
//! - Write-Behind: Drains deferred aggregate writes

mod cleanup;
mod write_behind;

pub use cleanup::spawn_cleanup_task;
pub use write_behind::{ErrorCallback, WriteBehindQueue, WriteJob};
