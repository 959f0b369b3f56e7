//! FlowGate: a health-aware HTTP/1.x reverse proxy.
//!
//! Each client connection carries one request. The proxy picks a backend
//! round-robin among those not cooling down, forwards the raw request, and
//! relays the response verbatim. Backends that fail repeatedly are taken
//! out of rotation for a cooldown window.

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod loadgen;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use error::StartupError;
pub use http::{Dispatcher, ProxyServer};
pub use lifecycle::Shutdown;
