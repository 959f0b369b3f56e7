//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Passive health checks (passive.rs):
//!     Forwarding outcome observed by the dispatcher
//!     → record_success / record_failure
//!     → Update state.rs under the backend's lock
//!
//! State machine (state.rs):
//!     Healthy → CoolingDown after failure_threshold consecutive failures
//!     CoolingDown → Healthy when the cooldown expires or a success lands
//! ```
//!
//! # Design Decisions
//! - Health state is per-backend, in memory, and lost on restart
//! - The selector and the tracker read the same record, so there is a single
//!   source of truth for "usable right now"

pub mod passive;
pub mod state;

pub use passive::HealthTracker;
pub use state::{HealthRecord, HealthState, Transition};
