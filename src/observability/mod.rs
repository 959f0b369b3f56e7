//! Logs and metrics.
//!
//! ```text
//! dispatcher, health tracker, server
//!     → logging.rs  (tracing events, pretty or JSON on stdout)
//!     → metrics.rs  (Prometheus counters, gauges, histogram)
//! ```
//!
//! Every dispatch log line carries the connection span (`id`, `peer`).
//! Recording never influences selection or health.

pub mod logging;
pub mod metrics;
