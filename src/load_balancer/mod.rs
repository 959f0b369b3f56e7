//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher asks for a backend
//!     → pool.rs (ordered registry of backends)
//!     → round_robin.rs (rotate from the cursor, skipping cooling-down backends)
//!     → backend.rs (identity + breaker record)
//!     → Return a backend, or None when every backend is cooling down
//! ```
//!
//! # Design Decisions
//! - The registry is fixed at startup; no dynamic add/remove
//! - Availability comes from the health tracker, never from a cached flag
//! - A selection attempt costs at most one pass over the pool

pub mod backend;
pub mod pool;
pub mod round_robin;

use std::sync::Arc;
use tokio::time::Instant;
use crate::health::HealthTracker;

pub use backend::Backend;
pub use pool::{BackendRegistry, BackendStatus, RegistryError};
pub use round_robin::RoundRobin;

/// Backend selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick the next backend that is available at `now`.
    fn next_server(
        &self,
        registry: &BackendRegistry,
        health: &HealthTracker,
        now: Instant,
    ) -> Option<Arc<Backend>>;
}
