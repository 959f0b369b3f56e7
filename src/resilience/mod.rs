//! Resilience primitives.
//!
//! # Data Flow
//! ```text
//! Dispatcher → backend:
//!     → timeouts.rs (connect / forward / read, each under its own deadline)
//!     → BackendError on any failure, reported to the health tracker
//!
//! Load generator → proxy:
//!     → backoff.rs (delay between client retries)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - The proxy never retries; retries with backoff are a client concern

pub mod backoff;
pub mod timeouts;

pub use backoff::calculate_backoff;
pub use timeouts::{BackendError, BackendStage};
